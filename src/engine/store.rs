//! Monitor persistence seen from the engine.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::{self, DatabaseError};
use crate::models::{EvaluationLogEntry, FactHistoryEntry, Monitor, MonitorUpdate};

#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn get_monitor(&self, id: &str) -> Result<Option<Monitor>, DatabaseError>;

    async fn list_active_monitors(&self) -> Result<Vec<Monitor>, DatabaseError>;

    /// Apply the update and append history atomically. A failure leaves
    /// the monitor row unchanged; `DatabaseError::Conflict` means another
    /// evaluation was written after the row was read.
    async fn record_evaluation(
        &self,
        id: &str,
        update: &MonitorUpdate,
        history: &FactHistoryEntry,
    ) -> Result<(), DatabaseError>;

    async fn insert_evaluation_log(&self, entry: &EvaluationLogEntry) -> Result<(), DatabaseError>;
}

/// SQLite-backed store. Statements are short, so the connection is held
/// under a plain mutex and never across an await point.
pub struct SqliteMonitorStore {
    conn: Mutex<Connection>,
}

impl SqliteMonitorStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (or create) the database file and run migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    /// Run a closure against the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    pub fn insert_monitor(&self, monitor: &Monitor) -> Result<(), DatabaseError> {
        self.with_connection(|conn| db::insert_monitor(conn, monitor))
    }

    pub fn set_monitor_active(&self, id: &str, active: bool) -> Result<(), DatabaseError> {
        self.with_connection(|conn| db::set_monitor_active(conn, id, active))
    }

    pub fn evaluation_log(&self, monitor_id: &str) -> Result<Vec<EvaluationLogEntry>, DatabaseError> {
        self.with_connection(|conn| db::list_evaluation_log(conn, monitor_id))
    }

    pub fn fact_history(
        &self,
        monitor_id: &str,
        limit: u32,
    ) -> Result<Vec<FactHistoryEntry>, DatabaseError> {
        self.with_connection(|conn| db::list_fact_history(conn, monitor_id, limit))
    }
}

#[async_trait]
impl MonitorStore for SqliteMonitorStore {
    async fn get_monitor(&self, id: &str) -> Result<Option<Monitor>, DatabaseError> {
        self.with_connection(|conn| db::get_monitor(conn, id))
    }

    async fn list_active_monitors(&self) -> Result<Vec<Monitor>, DatabaseError> {
        self.with_connection(db::list_active_monitors)
    }

    async fn record_evaluation(
        &self,
        id: &str,
        update: &MonitorUpdate,
        history: &FactHistoryEntry,
    ) -> Result<(), DatabaseError> {
        self.with_connection(|conn| db::record_evaluation(conn, id, update, history))
    }

    async fn insert_evaluation_log(&self, entry: &EvaluationLogEntry) -> Result<(), DatabaseError> {
        self.with_connection(|conn| db::insert_evaluation_log(conn, entry))
    }
}
