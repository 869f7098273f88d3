use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{column_to_value, format_timestamp, parse_timestamp, value_to_column};
use crate::db::DatabaseError;
use crate::models::*;

/// Append an entry to the evaluation log. Rows are never updated afterwards.
pub fn insert_evaluation_log(
    conn: &Connection,
    entry: &EvaluationLogEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO evaluation_log
         (id, monitor_id, phase, state, value, changed, triggered, error, duration_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id,
            entry.monitor_id,
            entry.phase.as_str(),
            entry.state,
            value_to_column(entry.value.as_ref())?,
            entry.changed.map(|b| b as i32),
            entry.triggered.map(|b| b as i32),
            entry.error,
            entry.duration_ms.map(|d| d as i64),
            format_timestamp(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// Log entries for one monitor, oldest first.
pub fn list_evaluation_log(
    conn: &Connection,
    monitor_id: &str,
) -> Result<Vec<EvaluationLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, monitor_id, phase, state, value, changed, triggered, error, duration_ms, created_at
         FROM evaluation_log
         WHERE monitor_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![monitor_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<i32>>(5)?,
            row.get::<_, Option<i32>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, Option<i64>>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, monitor_id, phase, state, value, changed, triggered, error, duration_ms, created_at) =
            row?;
        entries.push(EvaluationLogEntry {
            id,
            monitor_id,
            phase: EvaluationPhase::from_str(&phase)?,
            state,
            value: column_to_value(value)?,
            changed: changed.map(|v| v != 0),
            triggered: triggered.map(|v| v != 0),
            error,
            duration_ms: duration_ms.map(|d| d.max(0) as u64),
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(entries)
}

pub fn insert_fact_history(
    conn: &Connection,
    entry: &FactHistoryEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO fact_history
         (id, monitor_id, value, confidence, source_url, changed, triggered, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.monitor_id,
            serde_json::to_string(&entry.value)?,
            entry.confidence,
            entry.source_url,
            entry.changed as i32,
            entry.triggered as i32,
            format_timestamp(&entry.recorded_at),
        ],
    )?;
    Ok(())
}

/// Fact history for one monitor, newest first.
pub fn list_fact_history(
    conn: &Connection,
    monitor_id: &str,
    limit: u32,
) -> Result<Vec<FactHistoryEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, monitor_id, value, confidence, source_url, changed, triggered, recorded_at
         FROM fact_history
         WHERE monitor_id = ?1
         ORDER BY recorded_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![monitor_id, limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, i32>(5)?,
            row.get::<_, i32>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, monitor_id, value, confidence, source_url, changed, triggered, recorded_at) = row?;
        entries.push(FactHistoryEntry {
            id,
            monitor_id,
            value: serde_json::from_str(&value)?,
            confidence,
            source_url,
            changed: changed != 0,
            triggered: triggered != 0,
            recorded_at: parse_timestamp(&recorded_at)?,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_monitor;
    use crate::db::sqlite::open_memory_database;
    use chrono::Utc;
    use serde_json::json;

    fn seeded() -> (Connection, String) {
        let conn = open_memory_database().unwrap();
        let monitor = NewMonitor {
            user_id: "u".into(),
            prompt: "watch https://example.com".into(),
            target_fact: "status".into(),
            trigger_condition: "changes".into(),
            fact_type: FactType::String,
            monitor_kind: MonitorKind::Change,
            check_frequency_minutes: 15,
        }
        .into_monitor(Utc::now());
        insert_monitor(&conn, &monitor).unwrap();
        (conn, monitor.id)
    }

    #[test]
    fn log_entries_are_appended_in_order() {
        let (conn, id) = seeded();
        insert_evaluation_log(&conn, &EvaluationLogEntry::started(&id)).unwrap();

        let mut done = EvaluationLogEntry::started(&id);
        done.phase = EvaluationPhase::Completed;
        done.state = Some("done".into());
        done.value = Some(json!("open"));
        done.changed = Some(true);
        done.triggered = Some(false);
        done.duration_ms = Some(42);
        insert_evaluation_log(&conn, &done).unwrap();

        let entries = list_evaluation_log(&conn, &id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phase, EvaluationPhase::Started);
        assert_eq!(entries[1].phase, EvaluationPhase::Completed);
        assert_eq!(entries[1].value, Some(json!("open")));
        assert_eq!(entries[1].duration_ms, Some(42));
    }

    #[test]
    fn log_accepts_unknown_monitor_ids() {
        // not_found evaluations are still logged
        let conn = open_memory_database().unwrap();
        insert_evaluation_log(&conn, &EvaluationLogEntry::started("ghost")).unwrap();
        assert_eq!(list_evaluation_log(&conn, "ghost").unwrap().len(), 1);
    }

    #[test]
    fn fact_history_newest_first_with_limit() {
        let (conn, id) = seeded();
        for (i, v) in ["a", "b", "c"].iter().enumerate() {
            insert_fact_history(
                &conn,
                &FactHistoryEntry {
                    id: format!("h{i}"),
                    monitor_id: id.clone(),
                    value: json!(v),
                    confidence: Some(0.8),
                    source_url: Some("https://example.com".into()),
                    changed: true,
                    triggered: i == 2,
                    recorded_at: Utc::now() + chrono::Duration::seconds(i as i64),
                },
            )
            .unwrap();
        }

        let history = list_fact_history(&conn, &id, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, json!("c"));
        assert!(history[0].triggered);
    }
}
