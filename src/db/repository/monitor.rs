use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use super::{column_to_value, format_timestamp, parse_timestamp, value_to_column};
use crate::db::DatabaseError;
use crate::models::*;

const MONITOR_COLUMNS: &str = "id, user_id, prompt, target_fact, trigger_condition, fact_type,
     monitor_kind, is_active, current_value, previous_value, evaluation_count, trigger_count,
     check_frequency_minutes, last_evaluated_at, created_at, updated_at";

pub fn insert_monitor(conn: &Connection, monitor: &Monitor) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO monitors ({MONITOR_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            monitor.id,
            monitor.user_id,
            monitor.prompt,
            monitor.target_fact,
            monitor.trigger_condition,
            monitor.fact_type.as_str(),
            monitor.monitor_kind.as_str(),
            monitor.is_active as i32,
            value_to_column(monitor.current_value.as_ref())?,
            value_to_column(monitor.previous_value.as_ref())?,
            monitor.evaluation_count,
            monitor.trigger_count,
            monitor.check_frequency_minutes,
            monitor.last_evaluated_at.as_ref().map(format_timestamp),
            format_timestamp(&monitor.created_at),
            format_timestamp(&monitor.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_monitor(conn: &Connection, id: &str) -> Result<Option<Monitor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?1"))?;
    let row = stmt.query_row(params![id], read_monitor_row).optional()?;
    row.map(monitor_from_row).transpose()
}

/// Active monitors, oldest evaluation first so starved monitors run early.
pub fn list_active_monitors(conn: &Connection) -> Result<Vec<Monitor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors
         WHERE is_active = 1
         ORDER BY last_evaluated_at IS NOT NULL, last_evaluated_at ASC, created_at ASC"
    ))?;
    let rows = stmt.query_map([], read_monitor_row)?;

    let mut monitors = Vec::new();
    for row in rows {
        monitors.push(monitor_from_row(row?)?);
    }
    Ok(monitors)
}

pub fn set_monitor_active(conn: &Connection, id: &str, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE monitors SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            active as i32,
            format_timestamp(&chrono::Utc::now()),
            id
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Monitor".into(),
            id: id.into(),
        });
    }
    Ok(())
}

/// Apply an evaluation result to the monitor row.
///
/// A compare-and-swap on `evaluation_count`: the row only changes if no
/// other evaluation was written since `expected_evaluation_count` was read.
/// `previous_value` is taken from the row in the same statement.
pub fn apply_monitor_update(
    conn: &Connection,
    id: &str,
    update: &MonitorUpdate,
) -> Result<(), DatabaseError> {
    let evaluated_at = format_timestamp(&update.evaluated_at);
    let current = serde_json::to_string(&update.current_value)?;

    let changed = conn.execute(
        "UPDATE monitors SET
            previous_value = COALESCE(current_value, previous_value),
            current_value = ?1,
            evaluation_count = evaluation_count + 1,
            trigger_count = trigger_count + ?2,
            last_evaluated_at = ?3,
            updated_at = ?3
         WHERE id = ?4 AND evaluation_count = ?5",
        params![
            current,
            update.triggered as i32,
            evaluated_at,
            id,
            update.expected_evaluation_count
        ],
    )?;

    if changed == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM monitors WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        return Err(if exists {
            DatabaseError::Conflict {
                entity_type: "Monitor".into(),
                id: id.into(),
            }
        } else {
            DatabaseError::NotFound {
                entity_type: "Monitor".into(),
                id: id.into(),
            }
        });
    }
    Ok(())
}

/// Monitor update plus fact history in one transaction.
pub fn record_evaluation(
    conn: &Connection,
    id: &str,
    update: &MonitorUpdate,
    history: &FactHistoryEntry,
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    apply_monitor_update(&tx, id, update)?;
    super::insert_fact_history(&tx, history)?;
    tx.commit()?;
    Ok(())
}

struct MonitorRow {
    id: String,
    user_id: String,
    prompt: String,
    target_fact: String,
    trigger_condition: String,
    fact_type: String,
    monitor_kind: String,
    is_active: bool,
    current_value: Option<String>,
    previous_value: Option<String>,
    evaluation_count: u32,
    trigger_count: u32,
    check_frequency_minutes: u32,
    last_evaluated_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_monitor_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonitorRow> {
    Ok(MonitorRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prompt: row.get(2)?,
        target_fact: row.get(3)?,
        trigger_condition: row.get(4)?,
        fact_type: row.get(5)?,
        monitor_kind: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        current_value: row.get(8)?,
        previous_value: row.get(9)?,
        evaluation_count: row.get(10)?,
        trigger_count: row.get(11)?,
        check_frequency_minutes: row.get(12)?,
        last_evaluated_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn monitor_from_row(row: MonitorRow) -> Result<Monitor, DatabaseError> {
    Ok(Monitor {
        id: row.id,
        user_id: row.user_id,
        prompt: row.prompt,
        target_fact: row.target_fact,
        trigger_condition: row.trigger_condition,
        fact_type: FactType::from_str(&row.fact_type)?,
        monitor_kind: MonitorKind::from_str(&row.monitor_kind)?,
        is_active: row.is_active,
        current_value: column_to_value(row.current_value)?,
        previous_value: column_to_value(row.previous_value)?,
        evaluation_count: row.evaluation_count,
        trigger_count: row.trigger_count,
        check_frequency_minutes: row.check_frequency_minutes,
        last_evaluated_at: row.last_evaluated_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}
