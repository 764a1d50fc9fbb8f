use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::domain::models::{
    CANCELLED_STATUS, EventRecord, Flow, NewEventRecord, NewUserRecord, Role, UserRecord,
    UserStatus,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

// Column order in the event tables is load-bearing: downstream exports read
// the sheets positionally.
const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS start_stop_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    line TEXT NOT NULL,
    action TEXT NOT NULL,
    reason TEXT NOT NULL DEFAULT '',
    znp TEXT NOT NULL DEFAULT '',
    meters TEXT NOT NULL DEFAULT '',
    defect_type TEXT NOT NULL DEFAULT '',
    submitted_by TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS defect_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    line TEXT NOT NULL,
    action TEXT NOT NULL,
    znp TEXT NOT NULL DEFAULT '',
    meters TEXT NOT NULL DEFAULT '',
    defect_type TEXT NOT NULL DEFAULT '',
    submitted_by TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    full_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'operator',
    status TEXT NOT NULL DEFAULT 'pending',
    requested_via TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    approved_by INTEGER,
    approved_at TEXT
);

CREATE TABLE IF NOT EXISTS stop_reasons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS defect_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS observers (
    flow TEXT NOT NULL,
    chat_id INTEGER NOT NULL,
    UNIQUE (flow, chat_id)
);

CREATE INDEX IF NOT EXISTS idx_start_stop_events_submitted_by
ON start_stop_events (submitted_by, id DESC);

CREATE INDEX IF NOT EXISTS idx_defect_events_submitted_by
ON defect_events (submitted_by, id DESC);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("stored row is malformed: {0}")]
    MalformedRow(String),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Everything the dialog core needs from the row-oriented backing store.
pub trait RowStore {
    fn append_event(&self, flow: Flow, event: &NewEventRecord) -> Result<i64, DbError>;
    fn recent_events(&self, flow: Flow, limit: u32) -> Result<Vec<EventRecord>, DbError>;
    /// Most recent non-cancelled event submitted by the given user.
    fn last_active_event_by(
        &self,
        flow: Flow,
        submitter_id: i64,
    ) -> Result<Option<EventRecord>, DbError>;
    /// Write-once cancellation. Returns false when the row was already
    /// cancelled (or does not exist); the status is never reverted.
    fn mark_event_cancelled(&self, flow: Flow, event_id: i64) -> Result<bool, DbError>;

    fn get_user(&self, id: i64) -> Result<Option<UserRecord>, DbError>;
    fn list_users(&self) -> Result<Vec<UserRecord>, DbError>;
    fn insert_user(&self, user: &NewUserRecord) -> Result<(), DbError>;
    fn resolve_user(
        &self,
        id: i64,
        status: UserStatus,
        role: Option<Role>,
        approved_by: i64,
        approved_at: &str,
    ) -> Result<(), DbError>;

    fn stop_reasons(&self) -> Result<Vec<String>, DbError>;
    fn defect_types(&self) -> Result<Vec<String>, DbError>;
    fn observers(&self, flow: Flow) -> Result<Vec<i64>, DbError>;
}

fn event_table(flow: Flow) -> &'static str {
    match flow {
        Flow::StartStop => "start_stop_events",
        Flow::Defect => "defect_events",
    }
}

#[derive(Clone)]
pub struct SqliteRowStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRowStore {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let connection = self.connection.lock().map_err(|_| DbError::LockPoisoned)?;
        op(&connection)
    }
}

fn read_start_stop_event(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        date: row.get(1)?,
        time: row.get(2)?,
        line: row.get(3)?,
        action: row.get(4)?,
        reason: row.get(5)?,
        znp: row.get(6)?,
        meters: row.get(7)?,
        defect_type: row.get(8)?,
        submitted_by: row.get(9)?,
        submitted_at: row.get(10)?,
        status: row.get(11)?,
    })
}

fn read_defect_event(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        date: row.get(1)?,
        time: row.get(2)?,
        line: row.get(3)?,
        action: row.get(4)?,
        reason: String::new(),
        znp: row.get(5)?,
        meters: row.get(6)?,
        defect_type: row.get(7)?,
        submitted_by: row.get(8)?,
        submitted_at: row.get(9)?,
        status: row.get(10)?,
    })
}

fn read_user(row: &Row<'_>) -> Result<UserRecord, DbError> {
    let role: String = row.get(2).map_err(DbError::from)?;
    let status: String = row.get(3).map_err(DbError::from)?;
    Ok(UserRecord {
        id: row.get(0).map_err(DbError::from)?,
        full_name: row.get(1).map_err(DbError::from)?,
        role: Role::parse(&role).map_err(|err| DbError::MalformedRow(err.to_string()))?,
        status: UserStatus::parse(&status).map_err(|err| DbError::MalformedRow(err.to_string()))?,
        requested_via: row.get(4).map_err(DbError::from)?,
        created_at: row.get(5).map_err(DbError::from)?,
        approved_by: row.get(6).map_err(DbError::from)?,
        approved_at: row.get(7).map_err(DbError::from)?,
    })
}

const START_STOP_COLUMNS: &str =
    "id, date, time, line, action, reason, znp, meters, defect_type, submitted_by, submitted_at, status";
const DEFECT_COLUMNS: &str =
    "id, date, time, line, action, znp, meters, defect_type, submitted_by, submitted_at, status";
const USER_COLUMNS: &str =
    "id, full_name, role, status, requested_via, created_at, approved_by, approved_at";

impl RowStore for SqliteRowStore {
    fn append_event(&self, flow: Flow, event: &NewEventRecord) -> Result<i64, DbError> {
        self.with_connection(|connection| {
            match flow {
                Flow::StartStop => connection.execute(
                    "INSERT INTO start_stop_events
                     (date, time, line, action, reason, znp, meters, defect_type, submitted_by, submitted_at, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        event.date,
                        event.time,
                        event.line,
                        event.action,
                        event.reason,
                        event.znp,
                        event.meters,
                        event.defect_type,
                        event.submitted_by,
                        event.submitted_at,
                        event.status,
                    ],
                )?,
                Flow::Defect => connection.execute(
                    "INSERT INTO defect_events
                     (date, time, line, action, znp, meters, defect_type, submitted_by, submitted_at, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        event.date,
                        event.time,
                        event.line,
                        event.action,
                        event.znp,
                        event.meters,
                        event.defect_type,
                        event.submitted_by,
                        event.submitted_at,
                        event.status,
                    ],
                )?,
            };

            Ok(connection.last_insert_rowid())
        })
    }

    fn recent_events(&self, flow: Flow, limit: u32) -> Result<Vec<EventRecord>, DbError> {
        self.with_connection(|connection| {
            let (columns, mapper): (&str, fn(&Row<'_>) -> rusqlite::Result<EventRecord>) =
                match flow {
                    Flow::StartStop => (START_STOP_COLUMNS, read_start_stop_event),
                    Flow::Defect => (DEFECT_COLUMNS, read_defect_event),
                };
            let mut statement = connection.prepare(&format!(
                "SELECT {columns} FROM {} ORDER BY id DESC LIMIT ?1",
                event_table(flow)
            ))?;

            let rows = statement.query_map(params![i64::from(limit)], mapper)?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
    }

    fn last_active_event_by(
        &self,
        flow: Flow,
        submitter_id: i64,
    ) -> Result<Option<EventRecord>, DbError> {
        self.with_connection(|connection| {
            let (columns, mapper): (&str, fn(&Row<'_>) -> rusqlite::Result<EventRecord>) =
                match flow {
                    Flow::StartStop => (START_STOP_COLUMNS, read_start_stop_event),
                    Flow::Defect => (DEFECT_COLUMNS, read_defect_event),
                };
            // submitted_by holds "<id> (@username)".
            let pattern = format!("{submitter_id} (%");
            let event = connection
                .query_row(
                    &format!(
                        "SELECT {columns} FROM {}
                         WHERE submitted_by LIKE ?1 AND status != ?2
                         ORDER BY id DESC LIMIT 1",
                        event_table(flow)
                    ),
                    params![pattern, CANCELLED_STATUS],
                    mapper,
                )
                .optional()?;
            Ok(event)
        })
    }

    fn mark_event_cancelled(&self, flow: Flow, event_id: i64) -> Result<bool, DbError> {
        self.with_connection(|connection| {
            let changed = connection.execute(
                &format!(
                    "UPDATE {} SET status = ?1 WHERE id = ?2 AND status != ?1",
                    event_table(flow)
                ),
                params![CANCELLED_STATUS, event_id],
            )?;
            Ok(changed == 1)
        })
    }

    fn get_user(&self, id: i64) -> Result<Option<UserRecord>, DbError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
            let mut rows = statement.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(read_user(row)?)),
                None => Ok(None),
            }
        })
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, DbError> {
        self.with_connection(|connection| {
            let mut statement =
                connection.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
            let mut rows = statement.query([])?;
            let mut users = Vec::new();
            while let Some(row) = rows.next()? {
                users.push(read_user(row)?);
            }
            Ok(users)
        })
    }

    fn insert_user(&self, user: &NewUserRecord) -> Result<(), DbError> {
        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO users (id, full_name, role, status, requested_via, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.full_name,
                    Role::Operator.label(),
                    UserStatus::Pending.label(),
                    user.requested_via,
                    user.created_at,
                ],
            )?;
            Ok(())
        })
    }

    fn resolve_user(
        &self,
        id: i64,
        status: UserStatus,
        role: Option<Role>,
        approved_by: i64,
        approved_at: &str,
    ) -> Result<(), DbError> {
        self.with_connection(|connection| {
            match role {
                Some(role) => connection.execute(
                    "UPDATE users SET status = ?1, role = ?2, approved_by = ?3, approved_at = ?4
                     WHERE id = ?5",
                    params![status.label(), role.label(), approved_by, approved_at, id],
                )?,
                None => connection.execute(
                    "UPDATE users SET status = ?1, approved_by = ?2, approved_at = ?3
                     WHERE id = ?4",
                    params![status.label(), approved_by, approved_at, id],
                )?,
            };
            Ok(())
        })
    }

    fn stop_reasons(&self) -> Result<Vec<String>, DbError> {
        self.with_connection(|connection| label_column(connection, "stop_reasons"))
    }

    fn defect_types(&self) -> Result<Vec<String>, DbError> {
        self.with_connection(|connection| label_column(connection, "defect_types"))
    }

    fn observers(&self, flow: Flow) -> Result<Vec<i64>, DbError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare("SELECT chat_id FROM observers WHERE flow = ?1 ORDER BY chat_id")?;
            let rows = statement.query_map(params![flow.label()], |row| row.get(0))?;
            let mut chat_ids = Vec::new();
            for row in rows {
                chat_ids.push(row?);
            }
            Ok(chat_ids)
        })
    }
}

fn label_column(connection: &Connection, table: &str) -> Result<Vec<String>, DbError> {
    let mut statement = connection.prepare(&format!("SELECT label FROM {table} ORDER BY id"))?;
    let rows = statement.query_map([], |row| row.get(0))?;
    let mut labels = Vec::new();
    for row in rows {
        labels.push(row?);
    }
    Ok(labels)
}

/// Ops-facing seeding helpers; the lists themselves are maintained out of band.
impl SqliteRowStore {
    pub fn add_stop_reason(&self, label: &str) -> Result<(), DbError> {
        self.with_connection(|connection| {
            connection.execute(
                "INSERT OR IGNORE INTO stop_reasons (label) VALUES (?1)",
                params![label],
            )?;
            Ok(())
        })
    }

    pub fn add_defect_type(&self, label: &str) -> Result<(), DbError> {
        self.with_connection(|connection| {
            connection.execute(
                "INSERT OR IGNORE INTO defect_types (label) VALUES (?1)",
                params![label],
            )?;
            Ok(())
        })
    }

    pub fn add_observer(&self, flow: Flow, chat_id: i64) -> Result<(), DbError> {
        self.with_connection(|connection| {
            connection.execute(
                "INSERT OR IGNORE INTO observers (flow, chat_id) VALUES (?1, ?2)",
                params![flow.label(), chat_id],
            )?;
            Ok(())
        })
    }

    /// Promotes the very first account straight to approved admin so someone
    /// can resolve later registrations. No-op when the id is already present.
    pub fn bootstrap_admin(
        &self,
        id: i64,
        full_name: &str,
        created_at: &str,
    ) -> Result<(), DbError> {
        self.with_connection(|connection| {
            connection.execute(
                "INSERT OR IGNORE INTO users (id, full_name, role, status, requested_via, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'bootstrap', ?5)",
                params![
                    id,
                    full_name,
                    Role::Admin.label(),
                    UserStatus::Approved.label(),
                    created_at,
                ],
            )?;
            Ok(())
        })
    }
}
