//! Shared fixtures for the unit and endpoint tests.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::adapters::store::{RowStore, SqliteRowStore, open_connection, run_migrations};
use crate::adapters::telegram::{ChatTransport, TransportError};
use crate::domain::clock::Clock;
use crate::domain::engine::Outbound;
use crate::domain::models::{Flow, NewUserRecord, Role, UserStatus};

/// Fresh migrated store on a throwaway file, one per test.
pub fn open_test_store(name: &str) -> SqliteRowStore {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join(name);
    std::mem::forget(dir);

    let mut connection =
        open_connection(path.to_string_lossy().as_ref()).expect("db should open");
    run_migrations(&mut connection).expect("migrations should succeed");
    SqliteRowStore::new(Arc::new(Mutex::new(connection)))
}

pub fn seed_approved_user(store: &SqliteRowStore, id: i64, full_name: &str, role: Role) {
    store
        .insert_user(&NewUserRecord {
            id,
            full_name: full_name.to_string(),
            requested_via: "test".to_string(),
            created_at: "2026-01-01 00:00:00".to_string(),
        })
        .expect("insert should succeed");
    store
        .resolve_user(id, UserStatus::Approved, Some(role), 1, "2026-01-01 00:00:00")
        .expect("resolve should succeed");
}

pub fn seed_reference_data(
    store: &SqliteRowStore,
    stop_reasons: &[&str],
    defect_types: &[&str],
    observers: &[(Flow, i64)],
) {
    for reason in stop_reasons {
        store.add_stop_reason(reason).expect("seed should succeed");
    }
    for kind in defect_types {
        store.add_defect_type(kind).expect("seed should succeed");
    }
    for (flow, chat_id) in observers {
        store
            .add_observer(*flow, *chat_id)
            .expect("seed should succeed");
    }
}

/// Manually advanced clock; the shared cell lets a test move time forward
/// after the gateway has taken ownership of its clone.
#[derive(Clone)]
pub struct FixedClock {
    epoch: Rc<Cell<i64>>,
}

impl FixedClock {
    pub fn at(epoch: i64) -> Self {
        Self {
            epoch: Rc::new(Cell::new(epoch)),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.epoch.set(self.epoch.get() + secs);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.epoch.get(), 0)
            .single()
            .expect("test epoch should be valid")
    }
}

/// Captures outgoing messages instead of calling the chat service.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.sent.lock().expect("recorder lock"))
    }
}

impl ChatTransport for RecordingTransport {
    fn send(&self, outbound: &Outbound) -> Result<(), TransportError> {
        self.sent
            .lock()
            .expect("recorder lock")
            .push(outbound.clone());
        Ok(())
    }
}
