//! Connection setup and schema migrations for the monitor store.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use super::DatabaseError;

struct Migration {
    version: i64,
    sql: &'static str,
}

/// Applied in order; each one records its own version in `schema_version`.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("../../resources/migrations/001_initial.sql"),
}];

/// Tables the engine reads and writes, excluding bookkeeping.
pub const MONITOR_TABLES: &[&str] = &["monitors", "evaluation_log", "fact_history"];

/// Open (creating if needed) the monitor database at `path`.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        _ => {}
    }
    prepare(Connection::open(path)?)
}

/// Private in-memory database; gone when the connection drops.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, DatabaseError> {
    // In-memory databases silently keep journal_mode=memory.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Apply every migration newer than the stored schema version, each in its
/// own transaction.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        tracing::info!(version = migration.version, "Applying monitor schema migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .and_then(|()| tx.commit())
            .map_err(|e| DatabaseError::MigrationFailed {
                version: migration.version,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Highest applied migration, or 0 on a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let has_table = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !has_table {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// Names of the user tables present, sorted.
pub fn table_names(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
