use std::time::Duration;

use chrono::NaiveDateTime;

use crate::adapters::store::{DbError, RowStore};
use crate::domain::cache::TtlCache;
use crate::domain::clock::Clock;
use crate::domain::keyboard::{self, Keyboard, labels};
use crate::domain::models::{
    ACTIVE_STATUS, EventRecord, Flow, LineAction, NewEventRecord, UserRecord, UserStatus,
};
use crate::domain::session::{DialogState, FlowStep, RecordDraft, Session, SessionStore};
use crate::domain::validate;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One webhook event, already decoded by the transport adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Text {
        user_id: i64,
        chat_id: i64,
        username: String,
        text: String,
    },
    Callback {
        user_id: i64,
        chat_id: i64,
        data: String,
    },
}

/// One reply to deliver. The gateway never talks to the transport itself;
/// callers send these fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Outbound {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(chat_id: i64, text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub session_timeout: Duration,
    pub cache_ttl: Duration,
    /// Fixed offset of the factory's wall clock from UTC.
    pub time_offset_hours: i64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(600),
            cache_ttl: Duration::from_secs(300),
            time_offset_hours: 3,
        }
    }
}

/// The conversational core: authorization gate, dialog state machine,
/// cancellation workflow and idle eviction, all behind one owner. Every
/// inbound event is handled to completion; output is a list of replies.
pub struct Gateway<S, C> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) sessions: SessionStore,
    pub(crate) users: TtlCache<Vec<UserRecord>>,
    stop_reasons: TtlCache<Vec<String>>,
    defect_types: TtlCache<Vec<String>>,
    observers_start_stop: TtlCache<Vec<i64>>,
    observers_defect: TtlCache<Vec<i64>>,
    session_timeout: Duration,
    time_offset: chrono::Duration,
}

impl<S, C> Gateway<S, C>
where
    S: RowStore,
    C: Clock,
{
    pub fn new(store: S, clock: C, settings: GatewaySettings) -> Self {
        Self {
            store,
            clock,
            sessions: SessionStore::new(),
            users: TtlCache::new(settings.cache_ttl),
            stop_reasons: TtlCache::new(settings.cache_ttl),
            defect_types: TtlCache::new(settings.cache_ttl),
            observers_start_stop: TtlCache::new(settings.cache_ttl),
            observers_defect: TtlCache::new(settings.cache_ttl),
            session_timeout: settings.session_timeout,
            time_offset: chrono::Duration::hours(settings.time_offset_hours),
        }
    }

    pub fn process(&mut self, event: InboundEvent) -> Vec<Outbound> {
        match event {
            InboundEvent::Callback {
                user_id,
                chat_id,
                data,
            } => self.handle_approval_callback(user_id, chat_id, &data),
            InboundEvent::Text {
                user_id,
                chat_id,
                username,
                text,
            } => self.handle_text(user_id, chat_id, &username, text.trim()),
        }
    }

    /// Evicts idle sessions and returns one notice per evicted chat.
    pub fn sweep_idle(&mut self) -> Vec<Outbound> {
        let now = self.clock.now();
        self.sessions
            .sweep_expired(now, self.session_timeout)
            .into_iter()
            .map(|(user_id, chat_id)| {
                tracing::info!(user_id, "idle session evicted");
                Outbound::with_keyboard(
                    chat_id,
                    "Dialog closed due to inactivity.",
                    keyboard::main_menu(),
                )
            })
            .collect()
    }

    fn handle_text(
        &mut self,
        user_id: i64,
        chat_id: i64,
        username: &str,
        text: &str,
    ) -> Vec<Outbound> {
        let now = self.clock.now();
        self.sessions.touch(user_id, now);

        let user = match self.lookup_user(user_id) {
            Ok(user) => user,
            Err(error) => {
                tracing::error!(error = %error, user_id, "user lookup failed");
                return vec![Outbound::text(
                    chat_id,
                    "Service is temporarily unavailable, please try again.",
                )];
            }
        };

        match user {
            None => self.handle_registration(user_id, chat_id, username, text),
            Some(user) => match user.status {
                UserStatus::Approved => self.dialog(user_id, chat_id, username, text),
                UserStatus::Pending => vec![Outbound::text(
                    chat_id,
                    "Your registration is awaiting approval.",
                )],
                UserStatus::Rejected => vec![Outbound::text(chat_id, "Access denied.")],
            },
        }
    }

    fn dialog(&mut self, user_id: i64, chat_id: i64, username: &str, text: &str) -> Vec<Outbound> {
        if text == labels::BACK {
            self.sessions.remove(user_id);
            return vec![Outbound::with_keyboard(
                chat_id,
                "Main menu:",
                keyboard::main_menu(),
            )];
        }
        if text == labels::ABORT {
            self.sessions.remove(user_id);
            return vec![Outbound::with_keyboard(
                chat_id,
                "Cancelled.",
                keyboard::main_menu(),
            )];
        }

        let Some(session) = self.sessions.get(user_id) else {
            return self.open_section(user_id, chat_id, text);
        };

        match session.state.clone() {
            DialogState::FlowMenu(flow) => self.flow_menu_input(user_id, chat_id, flow, text),
            DialogState::ConfirmCancel {
                flow,
                event_id,
                preview,
            } => self.confirm_cancel_input(user_id, chat_id, flow, event_id, &preview, text),
            DialogState::InFlow { flow, step, draft } => {
                self.handle_flow_input(user_id, chat_id, username, flow, step, draft, text)
            }
            // Stale registration state for an already approved user.
            DialogState::AwaitingFullName => {
                self.sessions.remove(user_id);
                self.open_section(user_id, chat_id, text)
            }
        }
    }

    fn open_section(&mut self, user_id: i64, chat_id: i64, text: &str) -> Vec<Outbound> {
        let flow = match text {
            _ if text == labels::START_STOP => Some(Flow::StartStop),
            _ if text == labels::DEFECT => Some(Flow::Defect),
            _ => None,
        };

        match flow {
            Some(flow) => {
                let now = self.clock.now();
                self.sessions
                    .insert(user_id, Session::new(chat_id, DialogState::FlowMenu(flow), now));
                vec![Outbound::with_keyboard(
                    chat_id,
                    format!("<b>{}</b>\nChoose an action:", flow.title()),
                    keyboard::flow_menu(),
                )]
            }
            None => vec![Outbound::with_keyboard(
                chat_id,
                "Choose a section:",
                keyboard::main_menu(),
            )],
        }
    }

    fn flow_menu_input(
        &mut self,
        user_id: i64,
        chat_id: i64,
        flow: Flow,
        text: &str,
    ) -> Vec<Outbound> {
        if text == labels::NEW_RECORD {
            let preview = self.recent_records_preview(flow);
            let draft = RecordDraft::default();
            let mut out = vec![Outbound::text(chat_id, preview)];
            out.extend(self.advance(user_id, chat_id, flow, FlowStep::Line, draft));
            return out;
        }
        if text == labels::CANCEL_LAST {
            return self.start_cancellation(user_id, chat_id, flow);
        }
        vec![Outbound::with_keyboard(
            chat_id,
            "Choose an action:",
            keyboard::flow_menu(),
        )]
    }

    fn recent_records_preview(&mut self, flow: Flow) -> String {
        let records = match self.store.recent_events(flow, 2) {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(error = %error, flow = flow.label(), "recent records unavailable");
                Vec::new()
            }
        };

        let mut text = format!("<b>Last {} records:</b>\n\n", flow.title());
        if records.is_empty() {
            text.push_str("No records yet.");
        } else {
            for record in records {
                text.push_str(&format!("\u{2022} {}\n", record_preview(flow, &record)));
            }
        }
        text
    }

    fn handle_flow_input(
        &mut self,
        user_id: i64,
        chat_id: i64,
        username: &str,
        flow: Flow,
        step: FlowStep,
        mut draft: RecordDraft,
        text: &str,
    ) -> Vec<Outbound> {
        match step {
            FlowStep::Line => match validate::parse_line(text) {
                Ok(line) => {
                    draft.line = Some(line.to_string());
                    self.advance(user_id, chat_id, flow, FlowStep::Date, draft)
                }
                Err(_) => self.reprompt(chat_id, flow, &FlowStep::Line),
            },

            FlowStep::Date if text == labels::OTHER_DATE => {
                self.advance(user_id, chat_id, flow, FlowStep::DateCustom, draft)
            }
            FlowStep::Date | FlowStep::DateCustom => match validate::parse_date(text) {
                Ok(date) => {
                    draft.date = Some(date.format(validate::DATE_FORMAT).to_string());
                    self.advance(user_id, chat_id, flow, FlowStep::Time, draft)
                }
                Err(_) => self.reprompt(chat_id, flow, &step),
            },

            FlowStep::Time if text == labels::OTHER_TIME => {
                self.advance(user_id, chat_id, flow, FlowStep::TimeCustom, draft)
            }
            FlowStep::Time | FlowStep::TimeCustom => match validate::parse_time(text) {
                Ok(time) => {
                    draft.time = Some(time.format(validate::TIME_FORMAT).to_string());
                    let next = match flow {
                        Flow::Defect => FlowStep::ZnpPrefix,
                        Flow::StartStop => FlowStep::Action,
                    };
                    self.advance(user_id, chat_id, flow, next, draft)
                }
                Err(_) => self.reprompt(chat_id, flow, &step),
            },

            FlowStep::Action => match text {
                _ if text == labels::START => {
                    draft.action = Some(LineAction::Start);
                    self.advance(user_id, chat_id, flow, FlowStep::ZnpPrefix, draft)
                }
                _ if text == labels::STOP => {
                    draft.action = Some(LineAction::Stop);
                    self.advance(user_id, chat_id, flow, FlowStep::Reason, draft)
                }
                _ => self.reprompt(chat_id, flow, &FlowStep::Action),
            },

            FlowStep::Reason if text == labels::OTHER => {
                self.advance(user_id, chat_id, flow, FlowStep::ReasonCustom, draft)
            }
            FlowStep::Reason => {
                if self.cached_stop_reasons().iter().any(|reason| reason == text) {
                    draft.reason = Some(text.to_string());
                    self.advance(user_id, chat_id, flow, FlowStep::ZnpPrefix, draft)
                } else {
                    self.reprompt(chat_id, flow, &FlowStep::Reason)
                }
            }
            FlowStep::ReasonCustom => {
                draft.reason = Some(text.to_string());
                self.advance(user_id, chat_id, flow, FlowStep::ZnpPrefix, draft)
            }

            FlowStep::ZnpPrefix if text == labels::OTHER => {
                self.advance(user_id, chat_id, flow, FlowStep::ZnpManual, draft)
            }
            FlowStep::ZnpPrefix => {
                if validate::is_valid_znp_prefix(text, self.local_now().date()) {
                    let prefix = text.to_string();
                    self.advance(user_id, chat_id, flow, FlowStep::ZnpSuffix { prefix }, draft)
                } else {
                    self.reprompt(chat_id, flow, &FlowStep::ZnpPrefix)
                }
            }
            FlowStep::ZnpSuffix { prefix } => match validate::parse_znp_suffix(text) {
                Ok(suffix) => {
                    draft.znp = Some(format!("{prefix}-{suffix}"));
                    self.after_znp(user_id, chat_id, username, flow, draft)
                }
                Err(_) => self.reprompt(chat_id, flow, &FlowStep::ZnpSuffix { prefix }),
            },
            FlowStep::ZnpManual => match validate::parse_znp_code(text, self.local_now().date()) {
                Ok(code) => {
                    draft.znp = Some(code);
                    self.after_znp(user_id, chat_id, username, flow, draft)
                }
                Err(_) => self.reprompt(chat_id, flow, &FlowStep::ZnpManual),
            },

            FlowStep::Meters => match validate::parse_meters(text) {
                Ok(meters) => {
                    draft.meters = Some(meters.to_string());
                    self.advance(user_id, chat_id, flow, FlowStep::DefectType, draft)
                }
                Err(_) => self.reprompt(chat_id, flow, &FlowStep::Meters),
            },

            FlowStep::DefectType if text == labels::OTHER => {
                self.advance(user_id, chat_id, flow, FlowStep::DefectCustom, draft)
            }
            FlowStep::DefectType if text == labels::NO_DEFECT => {
                draft.defect_type = Some(String::new());
                self.commit(user_id, chat_id, username, flow, draft)
            }
            FlowStep::DefectType => {
                if self.cached_defect_types().iter().any(|kind| kind == text) {
                    draft.defect_type = Some(text.to_string());
                    self.commit(user_id, chat_id, username, flow, draft)
                } else {
                    self.reprompt(chat_id, flow, &FlowStep::DefectType)
                }
            }
            FlowStep::DefectCustom => {
                draft.defect_type = Some(text.to_string());
                self.commit(user_id, chat_id, username, flow, draft)
            }
        }
    }

    /// The start/stop flow ends at the ZNP; the defect flow continues with the
    /// damaged length and the defect type.
    fn after_znp(
        &mut self,
        user_id: i64,
        chat_id: i64,
        username: &str,
        flow: Flow,
        draft: RecordDraft,
    ) -> Vec<Outbound> {
        match flow {
            Flow::Defect => self.advance(user_id, chat_id, flow, FlowStep::Meters, draft),
            Flow::StartStop => self.commit(user_id, chat_id, username, flow, draft),
        }
    }

    fn advance(
        &mut self,
        user_id: i64,
        chat_id: i64,
        flow: Flow,
        step: FlowStep,
        draft: RecordDraft,
    ) -> Vec<Outbound> {
        let (text, keyboard) = self.step_prompt(flow, &step);
        self.set_state(user_id, chat_id, DialogState::InFlow { flow, step, draft });
        vec![Outbound::with_keyboard(chat_id, text, keyboard)]
    }

    /// Invalid input: same prompt, same keyboard, state untouched.
    fn reprompt(&mut self, chat_id: i64, flow: Flow, step: &FlowStep) -> Vec<Outbound> {
        let (text, keyboard) = self.step_prompt(flow, step);
        vec![Outbound::with_keyboard(chat_id, text, keyboard)]
    }

    fn step_prompt(&mut self, flow: Flow, step: &FlowStep) -> (String, Keyboard) {
        match step {
            FlowStep::Line => (
                "Enter line number (1\u{2013}15):".to_string(),
                keyboard::line_pad(),
            ),
            FlowStep::Date => {
                let today = self.local_now().date();
                let yesterday = today.pred_opt().unwrap_or(today);
                (
                    "Date:".to_string(),
                    keyboard::date_choices(
                        &today.format(validate::DATE_FORMAT).to_string(),
                        &yesterday.format(validate::DATE_FORMAT).to_string(),
                    ),
                )
            }
            FlowStep::DateCustom => (
                "Enter the date as dd.mm.yyyy:".to_string(),
                keyboard::abort_only(),
            ),
            FlowStep::Time => {
                let now = self.local_now();
                let quick = [0_i64, 10, 20, 30].map(|minutes| {
                    (now - chrono::Duration::minutes(minutes))
                        .format(validate::TIME_FORMAT)
                        .to_string()
                });
                ("Time:".to_string(), keyboard::time_choices(&quick))
            }
            FlowStep::TimeCustom => (
                "Enter the time as hh:mm:".to_string(),
                keyboard::abort_only(),
            ),
            FlowStep::Action => ("Action:".to_string(), keyboard::action_choices()),
            FlowStep::Reason => {
                let reasons = self.cached_stop_reasons();
                (
                    "Stop reason:".to_string(),
                    keyboard::pick_list(&reasons, &[labels::OTHER]),
                )
            }
            FlowStep::ReasonCustom => (
                "Describe the stop reason:".to_string(),
                keyboard::abort_only(),
            ),
            FlowStep::ZnpPrefix => {
                let prefixes = validate::znp_prefixes(self.local_now().date());
                (
                    "ZNP prefix:".to_string(),
                    keyboard::znp_prefix_choices(&prefixes),
                )
            }
            FlowStep::ZnpSuffix { prefix } => (
                format!("Last 4 digits for <b>{prefix}</b>-XXXX:"),
                keyboard::digit_pad("Last 4 digits"),
            ),
            FlowStep::ZnpManual => {
                let prefixes = validate::znp_prefixes(self.local_now().date());
                (
                    format!("Full ZNP code (e.g. <code>{}-1234</code>):", prefixes[0]),
                    keyboard::abort_only(),
                )
            }
            FlowStep::Meters => (
                "Meters of defect:".to_string(),
                keyboard::digit_pad("Meters"),
            ),
            FlowStep::DefectType => {
                let kinds = self.cached_defect_types();
                (
                    "Defect type:".to_string(),
                    keyboard::pick_list(&kinds, &[labels::OTHER, labels::NO_DEFECT]),
                )
            }
            FlowStep::DefectCustom => ("Describe the defect:".to_string(), keyboard::abort_only()),
        }
    }

    fn commit(
        &mut self,
        user_id: i64,
        chat_id: i64,
        username: &str,
        flow: Flow,
        draft: RecordDraft,
    ) -> Vec<Outbound> {
        let submitted_by = submitter_repr(user_id, username);
        let submitted_at = self.local_now().format(TIMESTAMP_FORMAT).to_string();

        let Some(record) = build_record(flow, &draft, &submitted_by, &submitted_at) else {
            tracing::error!(
                user_id,
                flow = flow.label(),
                "draft missing required fields at commit"
            );
            self.sessions.remove(user_id);
            return vec![Outbound::with_keyboard(
                chat_id,
                "Something went wrong, please start over.",
                keyboard::main_menu(),
            )];
        };

        match self.store.append_event(flow, &record) {
            Err(error) => {
                // Keep the session on its final step so the last value can be
                // re-sent; a validated record must not vanish silently.
                tracing::error!(error = %error, flow = flow.label(), user_id, "record append failed");
                vec![Outbound::text(
                    chat_id,
                    "The record could not be saved. Please send the last value again.",
                )]
            }
            Ok(event_id) => {
                tracing::info!(event_id, flow = flow.label(), user_id, "record committed");
                self.sessions.remove(user_id);
                self.sessions.rearm_cancellation(user_id);

                let mut out = Vec::new();
                let notice = observer_notice(flow, &record);
                for observer in self.cached_observers(flow) {
                    out.push(Outbound::text(observer, notice.clone()));
                }
                out.push(Outbound::with_keyboard(
                    chat_id,
                    confirmation_text(flow, &record),
                    keyboard::main_menu(),
                ));
                out
            }
        }
    }

    fn start_cancellation(&mut self, user_id: i64, chat_id: i64, flow: Flow) -> Vec<Outbound> {
        if self.sessions.cancel_used(user_id) {
            return vec![Outbound::with_keyboard(
                chat_id,
                "You have already cancelled a record; submit a new one first.",
                keyboard::flow_menu(),
            )];
        }

        match self.store.last_active_event_by(flow, user_id) {
            Err(error) => {
                tracing::error!(error = %error, flow = flow.label(), "last record lookup failed");
                vec![Outbound::text(
                    chat_id,
                    "Service is temporarily unavailable, please try again.",
                )]
            }
            Ok(None) => vec![Outbound::with_keyboard(
                chat_id,
                "Nothing to cancel yet.",
                keyboard::flow_menu(),
            )],
            Ok(Some(event)) => {
                let preview = record_preview(flow, &event);
                self.set_state(
                    user_id,
                    chat_id,
                    DialogState::ConfirmCancel {
                        flow,
                        event_id: event.id,
                        preview: preview.clone(),
                    },
                );
                vec![Outbound::with_keyboard(
                    chat_id,
                    format!("Cancel this record?\n{preview}"),
                    keyboard::confirm_cancel(),
                )]
            }
        }
    }

    fn confirm_cancel_input(
        &mut self,
        user_id: i64,
        chat_id: i64,
        flow: Flow,
        event_id: i64,
        preview: &str,
        text: &str,
    ) -> Vec<Outbound> {
        if text == labels::KEEP_RECORD {
            self.set_state(user_id, chat_id, DialogState::FlowMenu(flow));
            return vec![Outbound::with_keyboard(
                chat_id,
                "The record stays as it is.",
                keyboard::flow_menu(),
            )];
        }
        if text != labels::CONFIRM_CANCEL {
            return vec![Outbound::with_keyboard(
                chat_id,
                format!("Cancel this record?\n{preview}"),
                keyboard::confirm_cancel(),
            )];
        }

        match self.store.mark_event_cancelled(flow, event_id) {
            Err(error) => {
                tracing::error!(error = %error, event_id, "cancellation write failed");
                vec![Outbound::text(
                    chat_id,
                    "Could not cancel the record, please try again.",
                )]
            }
            Ok(false) => {
                self.set_state(user_id, chat_id, DialogState::FlowMenu(flow));
                vec![Outbound::with_keyboard(
                    chat_id,
                    "This record was already cancelled.",
                    keyboard::flow_menu(),
                )]
            }
            Ok(true) => {
                tracing::info!(event_id, flow = flow.label(), user_id, "record cancelled");
                self.sessions.mark_cancel_used(user_id);
                self.set_state(user_id, chat_id, DialogState::FlowMenu(flow));

                let mut out = Vec::new();
                let notice = format!("RECORD CANCELLED ({})\n{preview}", flow.title());
                for observer in self.cached_observers(flow) {
                    out.push(Outbound::text(observer, notice.clone()));
                }
                out.push(Outbound::with_keyboard(
                    chat_id,
                    "Record cancelled.",
                    keyboard::flow_menu(),
                ));
                out
            }
        }
    }

    pub(crate) fn set_state(&mut self, user_id: i64, chat_id: i64, state: DialogState) {
        let now = self.clock.now();
        match self.sessions.get_mut(user_id) {
            Some(session) => {
                session.state = state;
                session.last_activity = now;
            }
            None => self
                .sessions
                .insert(user_id, Session::new(chat_id, state, now)),
        }
    }

    pub(crate) fn local_now(&self) -> NaiveDateTime {
        (self.clock.now() + self.time_offset).naive_utc()
    }

    pub(crate) fn cached_users(&mut self) -> Result<Vec<UserRecord>, DbError> {
        let now = self.clock.now();
        let store = &self.store;
        self.users.get_or_refresh(now, || store.list_users())
    }

    fn lookup_user(&mut self, user_id: i64) -> Result<Option<UserRecord>, DbError> {
        Ok(self
            .cached_users()?
            .into_iter()
            .find(|user| user.id == user_id))
    }

    fn cached_stop_reasons(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let store = &self.store;
        self.stop_reasons
            .get_or_refresh(now, || store.stop_reasons())
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "stop reason list unavailable");
                Vec::new()
            })
    }

    fn cached_defect_types(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let store = &self.store;
        self.defect_types
            .get_or_refresh(now, || store.defect_types())
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "defect type list unavailable");
                Vec::new()
            })
    }

    fn cached_observers(&mut self, flow: Flow) -> Vec<i64> {
        let now = self.clock.now();
        let store = &self.store;
        let cache = match flow {
            Flow::StartStop => &mut self.observers_start_stop,
            Flow::Defect => &mut self.observers_defect,
        };
        cache
            .get_or_refresh(now, || store.observers(flow))
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, flow = flow.label(), "observer list unavailable");
                Vec::new()
            })
    }
}

pub(crate) fn submitter_repr(user_id: i64, username: &str) -> String {
    let username = if username.is_empty() { "no_user" } else { username };
    format!("{user_id} (@{username})")
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "\u{2014}" } else { value }
}

fn build_record(
    flow: Flow,
    draft: &RecordDraft,
    submitted_by: &str,
    submitted_at: &str,
) -> Option<NewEventRecord> {
    let line = draft.line.clone()?;
    let date = draft.date.clone()?;
    let time = draft.time.clone()?;

    let (action, reason, meters, defect_type) = match flow {
        Flow::Defect => (
            LineAction::Defect,
            String::new(),
            draft.meters.clone()?,
            draft.defect_type.clone().unwrap_or_default(),
        ),
        Flow::StartStop => {
            let action = draft.action?;
            let reason = match action {
                LineAction::Stop => draft.reason.clone()?,
                _ => draft.reason.clone().unwrap_or_default(),
            };
            (action, reason, String::new(), String::new())
        }
    };

    Some(NewEventRecord {
        date,
        time,
        line,
        action: action.label().to_string(),
        reason,
        znp: draft.znp.clone().unwrap_or_default(),
        meters,
        defect_type,
        submitted_by: submitted_by.to_string(),
        submitted_at: submitted_at.to_string(),
        status: ACTIVE_STATUS.to_string(),
    })
}

fn record_preview(flow: Flow, record: &EventRecord) -> String {
    match flow {
        Flow::Defect => format!(
            "{} {} | Line {} | <code>{}</code> | {} m | {}",
            record.date,
            record.time,
            record.line,
            or_dash(&record.znp),
            or_dash(&record.meters),
            or_dash(&record.defect_type),
        ),
        Flow::StartStop => format!(
            "{} {} | Line {} | {} | {}",
            record.date,
            record.time,
            record.line,
            action_title(&record.action),
            or_dash(&record.reason),
        ),
    }
}

fn action_title(action: &str) -> &str {
    match action {
        "start" => "Start",
        "stop" => "Stop",
        "defect" => "Defect",
        other => other,
    }
}

fn observer_notice(flow: Flow, record: &NewEventRecord) -> String {
    match flow {
        Flow::Defect => format!(
            "NEW DEFECT RECORD\nLine: {}\n{} {}\nZNP: <code>{}</code>\nMeters: {}\nDefect type: {}",
            record.line,
            record.date,
            record.time,
            or_dash(&record.znp),
            record.meters,
            or_dash(&record.defect_type),
        ),
        Flow::StartStop => format!(
            "NEW START/STOP RECORD\nLine: {}\n{} {}\nAction: {}\nReason: {}",
            record.line,
            record.date,
            record.time,
            action_title(&record.action),
            or_dash(&record.reason),
        ),
    }
}

fn confirmation_text(flow: Flow, record: &NewEventRecord) -> String {
    match flow {
        Flow::Defect => format!(
            "<b>Saved to '{}'!</b>\nLine {} \u{2022} {} {}\nZNP: <code>{}</code>\nMeters: {}\nDefect type: {}",
            flow.title(),
            record.line,
            record.date,
            record.time,
            or_dash(&record.znp),
            record.meters,
            or_dash(&record.defect_type),
        ),
        Flow::StartStop => format!(
            "<b>Saved to '{}'!</b>\nLine {} \u{2022} {} {}\nAction: {}\nReason: {}\nZNP: <code>{}</code>",
            flow.title(),
            record.line,
            record.date,
            record.time,
            action_title(&record.action),
            or_dash(&record.reason),
            or_dash(&record.znp),
        ),
    }
}
