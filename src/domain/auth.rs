//! Registration and approval: unknown accounts leave their full name, a
//! master or admin resolves the request from an inline keyboard. Role grants
//! are re-checked against the approver at callback time; keyboards are
//! advisory, the allow-list here is not.

use crate::adapters::store::RowStore;
use crate::domain::clock::Clock;
use crate::domain::command::ApprovalCommand;
use crate::domain::engine::{Gateway, Outbound, TIMESTAMP_FORMAT, submitter_repr};
use crate::domain::keyboard;
use crate::domain::models::{NewUserRecord, Role, UserRecord, UserStatus};
use crate::domain::session::{DialogState, Session};

const MIN_FULL_NAME_CHARS: usize = 5;

const MSG_UNAVAILABLE: &str = "Service is temporarily unavailable, please try again.";

impl<S, C> Gateway<S, C>
where
    S: RowStore,
    C: Clock,
{
    pub(crate) fn handle_registration(
        &mut self,
        user_id: i64,
        chat_id: i64,
        username: &str,
        text: &str,
    ) -> Vec<Outbound> {
        let awaiting_name = matches!(
            self.sessions.get(user_id).map(|session| &session.state),
            Some(DialogState::AwaitingFullName)
        );

        if !awaiting_name {
            let now = self.clock.now();
            self.sessions.insert(
                user_id,
                Session::new(chat_id, DialogState::AwaitingFullName, now),
            );
            return vec![Outbound::text(
                chat_id,
                "Welcome! Enter your full name to register:",
            )];
        }

        let full_name = text.trim();
        if full_name.chars().count() < MIN_FULL_NAME_CHARS {
            return vec![Outbound::text(
                chat_id,
                format!("Please enter your full name (at least {MIN_FULL_NAME_CHARS} characters):"),
            )];
        }

        let record = NewUserRecord {
            id: user_id,
            full_name: full_name.to_string(),
            requested_via: submitter_repr(user_id, username),
            created_at: self.local_now().format(TIMESTAMP_FORMAT).to_string(),
        };
        if let Err(error) = self.store.insert_user(&record) {
            // Session stays on the name step so the submission can be retried.
            tracing::error!(error = %error, user_id, "registration insert failed");
            return vec![Outbound::text(chat_id, MSG_UNAVAILABLE)];
        }

        tracing::info!(user_id, full_name, "registration request recorded");
        self.users.invalidate();
        self.sessions.remove(user_id);

        let approvers = match self.cached_users() {
            Ok(users) => users,
            Err(error) => {
                tracing::warn!(error = %error, "approver list unavailable");
                Vec::new()
            }
        };

        let mut out = Vec::new();
        for approver in approvers.iter().filter(|user| user.is_approver()) {
            out.push(Outbound::with_keyboard(
                approver.id,
                format!(
                    "New registration request:\n{full_name}\nid: <code>{user_id}</code>"
                ),
                keyboard::approval_request(user_id),
            ));
        }
        out.push(Outbound::text(
            chat_id,
            format!("Thanks, {full_name}! Your registration is awaiting approval."),
        ));
        out
    }

    pub(crate) fn handle_approval_callback(
        &mut self,
        user_id: i64,
        chat_id: i64,
        data: &str,
    ) -> Vec<Outbound> {
        let command = match ApprovalCommand::decode(data) {
            Ok(command) => command,
            Err(error) => {
                tracing::debug!(%error, user_id, "ignoring unrecognized callback");
                return Vec::new();
            }
        };

        // Rights are checked against the live row, not the cache.
        let approver = match self.store.get_user(user_id) {
            Ok(approver) => approver,
            Err(error) => {
                tracing::error!(error = %error, user_id, "approver lookup failed");
                return vec![Outbound::text(chat_id, MSG_UNAVAILABLE)];
            }
        };
        let Some(approver) = approver.filter(UserRecord::is_approver) else {
            return vec![Outbound::text(
                chat_id,
                "You are not allowed to manage registrations.",
            )];
        };

        let target_id = match command {
            ApprovalCommand::Approve { target }
            | ApprovalCommand::Reject { target }
            | ApprovalCommand::SetRole { target, .. } => target,
        };
        let target = match self.store.get_user(target_id) {
            Ok(Some(target)) => target,
            Ok(None) => return vec![Outbound::text(chat_id, "Unknown user.")],
            Err(error) => {
                tracing::error!(error = %error, target_id, "target lookup failed");
                return vec![Outbound::text(chat_id, MSG_UNAVAILABLE)];
            }
        };
        if target.status != UserStatus::Pending {
            return vec![Outbound::text(
                chat_id,
                "This request was already resolved.",
            )];
        }

        match command {
            ApprovalCommand::Approve { .. } => vec![Outbound::with_keyboard(
                chat_id,
                format!("Choose a role for {}:", target.full_name),
                keyboard::role_choices(target.id, approver.role.grantable()),
            )],
            ApprovalCommand::SetRole { role, .. } => {
                self.grant_role(&approver, &target, role, chat_id)
            }
            ApprovalCommand::Reject { .. } => self.reject(&approver, &target, chat_id),
        }
    }

    fn grant_role(
        &mut self,
        approver: &UserRecord,
        target: &UserRecord,
        role: Role,
        chat_id: i64,
    ) -> Vec<Outbound> {
        if !approver.role.may_grant(role) {
            tracing::warn!(
                approver = approver.id,
                target = target.id,
                role = role.label(),
                "role grant refused"
            );
            return vec![Outbound::text(
                chat_id,
                format!("You are not allowed to grant {}.", role.title()),
            )];
        }

        let approved_at = self.local_now().format(TIMESTAMP_FORMAT).to_string();
        if let Err(error) =
            self.store
                .resolve_user(target.id, UserStatus::Approved, Some(role), approver.id, &approved_at)
        {
            tracing::error!(error = %error, target = target.id, "approval write failed");
            return vec![Outbound::text(chat_id, MSG_UNAVAILABLE)];
        }

        tracing::info!(
            approver = approver.id,
            target = target.id,
            role = role.label(),
            "registration approved"
        );
        self.users.invalidate();

        vec![
            Outbound::with_keyboard(
                target.id,
                format!(
                    "Hi, {}! Your registration is approved. Role: {}.",
                    target.full_name,
                    role.title()
                ),
                keyboard::main_menu(),
            ),
            Outbound::text(
                chat_id,
                format!("{} approved as {}.", target.full_name, role.title()),
            ),
        ]
    }

    fn reject(
        &mut self,
        approver: &UserRecord,
        target: &UserRecord,
        chat_id: i64,
    ) -> Vec<Outbound> {
        let resolved_at = self.local_now().format(TIMESTAMP_FORMAT).to_string();
        if let Err(error) = self.store.resolve_user(
            target.id,
            UserStatus::Rejected,
            None,
            approver.id,
            &resolved_at,
        ) {
            tracing::error!(error = %error, target = target.id, "rejection write failed");
            return vec![Outbound::text(chat_id, MSG_UNAVAILABLE)];
        }

        tracing::info!(approver = approver.id, target = target.id, "registration rejected");
        self.users.invalidate();

        vec![
            Outbound::text(target.id, "Your registration was rejected."),
            Outbound::text(chat_id, format!("{} rejected.", target.full_name)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::store::{RowStore, SqliteRowStore};
    use crate::domain::command::ApprovalCommand;
    use crate::domain::engine::{Gateway, GatewaySettings, InboundEvent, Outbound};
    use crate::domain::keyboard::Keyboard;
    use crate::domain::models::{Role, UserStatus};
    use crate::test_support::{FixedClock, open_test_store, seed_approved_user};

    const ADMIN: i64 = 111;
    const MASTER: i64 = 222;
    const NEWCOMER: i64 = 999;

    const BASE_EPOCH: i64 = 1_768_478_400;

    fn gateway(name: &str) -> Gateway<SqliteRowStore, FixedClock> {
        let store = open_test_store(name);
        seed_approved_user(&store, ADMIN, "Ada Admin", Role::Admin);
        seed_approved_user(&store, MASTER, "Max Master", Role::Master);
        Gateway::new(store, FixedClock::at(BASE_EPOCH), GatewaySettings::default())
    }

    fn text_from(
        gateway: &mut Gateway<SqliteRowStore, FixedClock>,
        user_id: i64,
        text: &str,
    ) -> Vec<Outbound> {
        gateway.process(InboundEvent::Text {
            user_id,
            chat_id: user_id,
            username: "someone".to_string(),
            text: text.to_string(),
        })
    }

    fn callback_from(
        gateway: &mut Gateway<SqliteRowStore, FixedClock>,
        user_id: i64,
        command: ApprovalCommand,
    ) -> Vec<Outbound> {
        gateway.process(InboundEvent::Callback {
            user_id,
            chat_id: user_id,
            data: command.encode(),
        })
    }

    fn register(gateway: &mut Gateway<SqliteRowStore, FixedClock>) -> Vec<Outbound> {
        text_from(gateway, NEWCOMER, "hello");
        text_from(gateway, NEWCOMER, "Jane Q Operator")
    }

    fn inline_rows(outbound: &Outbound) -> Vec<Vec<(String, String)>> {
        match outbound.keyboard.clone().expect("an inline keyboard") {
            Keyboard::Inline { rows } => rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|button| (button.label, button.data))
                        .collect()
                })
                .collect(),
            Keyboard::Reply { .. } => panic!("expected inline keyboard"),
        }
    }

    #[test]
    fn unknown_user_is_asked_for_a_full_name() {
        let mut gateway = gateway("auth-prompt.sqlite");
        let out = text_from(&mut gateway, NEWCOMER, "/start");
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("full name"));
    }

    #[test]
    fn short_names_are_reprompted() {
        let mut gateway = gateway("auth-short.sqlite");
        text_from(&mut gateway, NEWCOMER, "/start");

        let out = text_from(&mut gateway, NEWCOMER, "Jo");
        assert!(out[0].text.contains("at least 5"));
        assert!(
            gateway
                .store
                .get_user(NEWCOMER)
                .expect("query should succeed")
                .is_none()
        );

        // Still on the name step: a proper name goes through.
        let out = text_from(&mut gateway, NEWCOMER, "Jane Q Operator");
        assert!(out.last().expect("a reply").text.contains("awaiting approval"));
    }

    #[test]
    fn registration_notifies_every_approver_with_inline_buttons() {
        let mut gateway = gateway("auth-notify.sqlite");
        let out = register(&mut gateway);

        let approver_notes: Vec<&Outbound> = out
            .iter()
            .filter(|outbound| outbound.chat_id == ADMIN || outbound.chat_id == MASTER)
            .collect();
        assert_eq!(approver_notes.len(), 2);

        let rows = inline_rows(approver_notes[0]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].1, format!("approve_{NEWCOMER}"));
        assert_eq!(rows[0][1].1, format!("reject_{NEWCOMER}"));

        let stored = gateway
            .store
            .get_user(NEWCOMER)
            .expect("query should succeed")
            .expect("user should exist");
        assert_eq!(stored.status, UserStatus::Pending);
    }

    #[test]
    fn pending_user_is_told_to_wait() {
        let mut gateway = gateway("auth-pending.sqlite");
        register(&mut gateway);

        let out = text_from(&mut gateway, NEWCOMER, "/start");
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("awaiting approval"));
    }

    #[test]
    fn approve_offers_only_roles_the_approver_may_grant() {
        let mut gateway = gateway("auth-roles.sqlite");
        register(&mut gateway);

        let admin_offer = callback_from(
            &mut gateway,
            ADMIN,
            ApprovalCommand::Approve { target: NEWCOMER },
        );
        let labels: Vec<String> = inline_rows(&admin_offer[0])[0]
            .iter()
            .map(|(label, _)| label.clone())
            .collect();
        assert_eq!(labels, ["Operator", "Master", "Admin"]);

        let master_offer = callback_from(
            &mut gateway,
            MASTER,
            ApprovalCommand::Approve { target: NEWCOMER },
        );
        let labels: Vec<String> = inline_rows(&master_offer[0])[0]
            .iter()
            .map(|(label, _)| label.clone())
            .collect();
        assert_eq!(labels, ["Operator", "Master"]);
    }

    #[test]
    fn master_granting_admin_is_refused_without_mutation() {
        let mut gateway = gateway("auth-escalation.sqlite");
        register(&mut gateway);

        let out = callback_from(
            &mut gateway,
            MASTER,
            ApprovalCommand::SetRole {
                target: NEWCOMER,
                role: Role::Admin,
            },
        );
        assert!(out[0].text.contains("not allowed to grant Admin"));

        let stored = gateway
            .store
            .get_user(NEWCOMER)
            .expect("query should succeed")
            .expect("user should exist");
        assert_eq!(stored.status, UserStatus::Pending);
        assert_eq!(stored.role, Role::Operator);
    }

    #[test]
    fn granting_a_role_approves_and_notifies_the_target() {
        let mut gateway = gateway("auth-grant.sqlite");
        register(&mut gateway);

        let out = callback_from(
            &mut gateway,
            ADMIN,
            ApprovalCommand::SetRole {
                target: NEWCOMER,
                role: Role::Master,
            },
        );

        let to_target = out
            .iter()
            .find(|outbound| outbound.chat_id == NEWCOMER)
            .expect("target should be notified");
        assert!(to_target.text.contains("approved"));
        assert!(to_target.text.contains("Master"));

        let stored = gateway
            .store
            .get_user(NEWCOMER)
            .expect("query should succeed")
            .expect("user should exist");
        assert_eq!(stored.status, UserStatus::Approved);
        assert_eq!(stored.role, Role::Master);
        assert_eq!(stored.approved_by, Some(ADMIN));

        // The fresh approval is visible immediately despite the cache.
        let menu = text_from(&mut gateway, NEWCOMER, "hello");
        assert_eq!(menu[0].text, "Choose a section:");
    }

    #[test]
    fn rejection_is_terminal() {
        let mut gateway = gateway("auth-reject.sqlite");
        register(&mut gateway);

        let out = callback_from(
            &mut gateway,
            ADMIN,
            ApprovalCommand::Reject { target: NEWCOMER },
        );
        assert!(
            out.iter()
                .any(|outbound| outbound.chat_id == NEWCOMER
                    && outbound.text.contains("rejected"))
        );

        let denied = text_from(&mut gateway, NEWCOMER, "/start");
        assert_eq!(denied[0].text, "Access denied.");
    }

    #[test]
    fn resolved_requests_are_not_resolved_twice() {
        let mut gateway = gateway("auth-twice.sqlite");
        register(&mut gateway);
        callback_from(
            &mut gateway,
            ADMIN,
            ApprovalCommand::SetRole {
                target: NEWCOMER,
                role: Role::Operator,
            },
        );

        let out = callback_from(
            &mut gateway,
            MASTER,
            ApprovalCommand::Reject { target: NEWCOMER },
        );
        assert!(out[0].text.contains("already resolved"));

        let stored = gateway
            .store
            .get_user(NEWCOMER)
            .expect("query should succeed")
            .expect("user should exist");
        assert_eq!(stored.status, UserStatus::Approved);
    }

    #[test]
    fn non_approvers_cannot_manage_registrations() {
        let mut gateway = gateway("auth-operator.sqlite");
        seed_approved_user(&gateway.store, 333, "Olive Operator", Role::Operator);
        register(&mut gateway);

        let out = callback_from(
            &mut gateway,
            333,
            ApprovalCommand::Approve { target: NEWCOMER },
        );
        assert!(out[0].text.contains("not allowed"));
    }

    #[test]
    fn malformed_callbacks_are_ignored() {
        let mut gateway = gateway("auth-garbage.sqlite");
        let out = gateway.process(InboundEvent::Callback {
            user_id: ADMIN,
            chat_id: ADMIN,
            data: "promote_999".to_string(),
        });
        assert!(out.is_empty());
    }
}
