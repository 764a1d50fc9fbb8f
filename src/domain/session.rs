use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::models::{Flow, LineAction};

/// Where a dialog currently is. Every position is an explicit variant; the
/// engine never infers state from which draft fields happen to be filled.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogState {
    /// Registration: waiting for the full name of an unknown user.
    AwaitingFullName,
    /// A flow section is open, no record entry started yet.
    FlowMenu(Flow),
    /// Stepping through a record entry.
    InFlow {
        flow: Flow,
        step: FlowStep,
        draft: RecordDraft,
    },
    /// Cancellation asked, waiting for the yes/no confirmation. The preview
    /// line is kept so the observer notice matches what the user confirmed.
    ConfirmCancel {
        flow: Flow,
        event_id: i64,
        preview: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    Line,
    Date,
    DateCustom,
    Time,
    TimeCustom,
    Action,
    Reason,
    ReasonCustom,
    ZnpPrefix,
    /// Prefix picked from the quick keyboard; four suffix digits outstanding.
    ZnpSuffix { prefix: String },
    ZnpManual,
    Meters,
    DefectType,
    DefectCustom,
}

/// Partially collected record fields. Everything stays in the entered string
/// form; validation happens on the way in, assembly on commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub line: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub action: Option<LineAction>,
    pub reason: Option<String>,
    pub znp: Option<String>,
    pub meters: Option<String>,
    pub defect_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub chat_id: i64,
    pub state: DialogState,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(chat_id: i64, state: DialogState, now: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            state,
            last_activity: now,
        }
    }
}

/// Sole owner of ephemeral per-user dialog state. The one-shot cancellation
/// flags live beside the session map on purpose: idle eviction or an explicit
/// abort destroys the session but must not re-arm cancellation; only a
/// successful record commit does.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<i64, Session>,
    cancel_used: HashSet<i64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i64) -> Option<&Session> {
        self.sessions.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: i64) -> Option<&mut Session> {
        self.sessions.get_mut(&user_id)
    }

    pub fn insert(&mut self, user_id: i64, session: Session) {
        self.sessions.insert(user_id, session);
    }

    pub fn remove(&mut self, user_id: i64) -> Option<Session> {
        self.sessions.remove(&user_id)
    }

    pub fn touch(&mut self, user_id: i64, now: DateTime<Utc>) {
        if let Some(session) = self.sessions.get_mut(&user_id) {
            session.last_activity = now;
        }
    }

    pub fn cancel_used(&self, user_id: i64) -> bool {
        self.cancel_used.contains(&user_id)
    }

    pub fn mark_cancel_used(&mut self, user_id: i64) {
        self.cancel_used.insert(user_id);
    }

    /// Called on successful commit only.
    pub fn rearm_cancellation(&mut self, user_id: i64) {
        self.cancel_used.remove(&user_id);
    }

    /// Evicts every session idle longer than `timeout` and returns the
    /// (user, chat) pairs so the caller can notify each chat once.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<(i64, i64)> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        let expired: Vec<(i64, i64)> = self
            .sessions
            .iter()
            .filter(|(_, session)| now - session.last_activity > timeout)
            .map(|(user_id, session)| (*user_id, session.chat_id))
            .collect();

        for (user_id, _) in &expired {
            self.sessions.remove(user_id);
        }

        expired
    }
}
