use thiserror::Error;

use crate::domain::models::Role;

/// An inline-button action, decoded once at the transport boundary. The wire
/// form is the delimited token the keyboards carry: `approve_<id>`,
/// `reject_<id>`, `setrole_<id>_<role>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalCommand {
    Approve { target: i64 },
    Reject { target: i64 },
    SetRole { target: i64, role: Role },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized callback payload: {0}")]
pub struct UnknownCommand(pub String);

impl ApprovalCommand {
    pub fn encode(&self) -> String {
        match self {
            ApprovalCommand::Approve { target } => format!("approve_{target}"),
            ApprovalCommand::Reject { target } => format!("reject_{target}"),
            ApprovalCommand::SetRole { target, role } => {
                format!("setrole_{target}_{}", role.label())
            }
        }
    }

    pub fn decode(data: &str) -> Result<Self, UnknownCommand> {
        let unknown = || UnknownCommand(data.to_string());

        if let Some(rest) = data.strip_prefix("approve_") {
            let target = rest.parse().map_err(|_| unknown())?;
            return Ok(ApprovalCommand::Approve { target });
        }
        if let Some(rest) = data.strip_prefix("reject_") {
            let target = rest.parse().map_err(|_| unknown())?;
            return Ok(ApprovalCommand::Reject { target });
        }
        if let Some(rest) = data.strip_prefix("setrole_") {
            let (target, role) = rest.split_once('_').ok_or_else(unknown)?;
            let target = target.parse().map_err(|_| unknown())?;
            let role = Role::parse(role).map_err(|_| unknown())?;
            return Ok(ApprovalCommand::SetRole { target, role });
        }

        Err(unknown())
    }
}

#[cfg(test)]
mod tests {
    use super::ApprovalCommand;
    use crate::domain::models::Role;

    #[test]
    fn encodes_and_decodes_every_variant() {
        let commands = [
            ApprovalCommand::Approve { target: 999 },
            ApprovalCommand::Reject { target: 42 },
            ApprovalCommand::SetRole {
                target: 999,
                role: Role::Operator,
            },
        ];
        for command in commands {
            assert_eq!(ApprovalCommand::decode(&command.encode()), Ok(command));
        }
    }

    #[test]
    fn decodes_the_legacy_token_shape() {
        assert_eq!(
            ApprovalCommand::decode("setrole_999_operator"),
            Ok(ApprovalCommand::SetRole {
                target: 999,
                role: Role::Operator,
            })
        );
    }

    #[test]
    fn rejects_malformed_payloads() {
        for data in [
            "",
            "approve_",
            "approve_abc",
            "setrole_999",
            "setrole_999_supervisor",
            "promote_999",
        ] {
            assert!(ApprovalCommand::decode(data).is_err(), "{data:?}");
        }
    }
}
