use thiserror::Error;

/// Marker written into the status column when a record is cancelled.
/// Write-once: a cancelled record is never reverted to active.
pub const CANCELLED_STATUS: &str = "CANCELLED";

/// Status column value for a record that is still active.
pub const ACTIVE_STATUS: &str = "";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    StartStop,
    Defect,
}

impl Flow {
    pub fn label(self) -> &'static str {
        match self {
            Flow::StartStop => "start_stop",
            Flow::Defect => "defect",
        }
    }

    /// Human-facing sheet name used in confirmations.
    pub fn title(self) -> &'static str {
        match self {
            Flow::StartStop => "Start/Stop",
            Flow::Defect => "Defect",
        }
    }

    pub fn parse(label: &str) -> Result<Self, UnknownLabel> {
        match label {
            "start_stop" => Ok(Flow::StartStop),
            "defect" => Ok(Flow::Defect),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    Start,
    Stop,
    Defect,
}

impl LineAction {
    pub fn label(self) -> &'static str {
        match self {
            LineAction::Start => "start",
            LineAction::Stop => "stop",
            LineAction::Defect => "defect",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            LineAction::Start => "Start",
            LineAction::Stop => "Stop",
            LineAction::Defect => "Defect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Operator,
    Master,
    Admin,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::Master => "master",
            Role::Admin => "admin",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Role::Operator => "Operator",
            Role::Master => "Master",
            Role::Admin => "Admin",
        }
    }

    pub fn parse(label: &str) -> Result<Self, UnknownLabel> {
        match label {
            "operator" => Ok(Role::Operator),
            "master" => Ok(Role::Master),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownLabel(other.to_string())),
        }
    }

    /// Roles this role is allowed to grant when resolving a registration.
    /// Only admin may hand out admin.
    pub fn grantable(self) -> &'static [Role] {
        match self {
            Role::Admin => &[Role::Operator, Role::Master, Role::Admin],
            Role::Master => &[Role::Operator, Role::Master],
            Role::Operator => &[],
        }
    }

    pub fn may_grant(self, role: Role) -> bool {
        self.grantable().contains(&role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
}

impl UserStatus {
    pub fn label(self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Rejected => "rejected",
        }
    }

    pub fn parse(label: &str) -> Result<Self, UnknownLabel> {
        match label {
            "pending" => Ok(UserStatus::Pending),
            "approved" => Ok(UserStatus::Approved),
            "rejected" => Ok(UserStatus::Rejected),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// One committed shift-log row. Field order mirrors the store's column order;
/// empty strings stand for columns the flow did not fill.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub date: String,
    pub time: String,
    pub line: String,
    pub action: String,
    pub reason: String,
    pub znp: String,
    pub meters: String,
    pub defect_type: String,
    pub submitted_by: String,
    pub submitted_at: String,
    pub status: String,
}

impl EventRecord {
    pub fn is_active(&self) -> bool {
        self.status != CANCELLED_STATUS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEventRecord {
    pub date: String,
    pub time: String,
    pub line: String,
    pub action: String,
    pub reason: String,
    pub znp: String,
    pub meters: String,
    pub defect_type: String,
    pub submitted_by: String,
    pub submitted_at: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub full_name: String,
    pub role: Role,
    pub status: UserStatus,
    pub requested_via: String,
    pub created_at: String,
    pub approved_by: Option<i64>,
    pub approved_at: Option<String>,
}

impl UserRecord {
    /// Approved master/admin accounts resolve pending registrations.
    pub fn is_approver(&self) -> bool {
        self.status == UserStatus::Approved && matches!(self.role, Role::Master | Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUserRecord {
    pub id: i64,
    pub full_name: String,
    pub requested_via: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::{Flow, Role, UserStatus};

    #[test]
    fn role_labels_round_trip() {
        for role in [Role::Operator, Role::Master, Role::Admin] {
            assert_eq!(Role::parse(role.label()), Ok(role));
        }
        assert!(Role::parse("supervisor").is_err());
    }

    #[test]
    fn master_may_not_grant_admin() {
        assert!(!Role::Master.may_grant(Role::Admin));
        assert!(Role::Master.may_grant(Role::Operator));
        assert!(Role::Master.may_grant(Role::Master));
    }

    #[test]
    fn admin_may_grant_every_role() {
        for role in [Role::Operator, Role::Master, Role::Admin] {
            assert!(Role::Admin.may_grant(role));
        }
    }

    #[test]
    fn operator_grants_nothing() {
        assert!(Role::Operator.grantable().is_empty());
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [UserStatus::Pending, UserStatus::Approved, UserStatus::Rejected] {
            assert_eq!(UserStatus::parse(status.label()), Ok(status));
        }
    }

    #[test]
    fn flow_labels_round_trip() {
        assert_eq!(Flow::parse("start_stop"), Ok(Flow::StartStop));
        assert_eq!(Flow::parse("defect"), Ok(Flow::Defect));
        assert!(Flow::parse("scrap").is_err());
    }
}
