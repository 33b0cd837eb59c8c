// Alert history queries
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use std::error::Error;

use super::db::{DbConnection, DbResult};
use crate::alerts::{Alert, Category, HistoryMirror, Severity};
use crate::classifier::{ClassificationSource, SoundLabel};

/// Store one dispatched alert
pub fn insert_alert(db: &DbConnection, alert: &Alert) -> DbResult<()> {
    let conn = db.lock();
    conn.execute(
        "INSERT INTO alerts (id, label, category, severity, location, confidence, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            alert.id as i64,
            alert.label.as_str(),
            alert.category.as_str(),
            alert.severity.as_str(),
            alert.location,
            alert.confidence as f64,
            alert.source.as_str(),
            alert.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// Most recent alerts, newest first
pub fn list_recent_alerts(db: &DbConnection, limit: usize) -> DbResult<Vec<Alert>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, label, category, severity, location, confidence, source, created_at
         FROM alerts ORDER BY id DESC LIMIT ?1",
    )?;

    let alerts = stmt
        .query_map([limit as i64], alert_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(alerts)
}

/// Id and time of the newest stored alert
pub fn latest_alert_marker(db: &DbConnection) -> DbResult<Option<(u64, DateTime<Utc>)>> {
    let conn = db.lock();
    let result = conn.query_row(
        "SELECT id, created_at FROM alerts ORDER BY id DESC LIMIT 1",
        [],
        |row| Ok((row.get::<_, i64>(0)? as u64, parse_time(row, 1)?)),
    );

    match result {
        Ok(marker) => Ok(Some(marker)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_alerts(db: &DbConnection) -> DbResult<u64> {
    let conn = db.lock();
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Delete alerts created before `cutoff`; returns how many were removed
pub fn prune_older_than(db: &DbConnection, cutoff: DateTime<Utc>) -> DbResult<usize> {
    let conn = db.lock();
    let removed = conn.execute(
        "DELETE FROM alerts WHERE created_at < ?1",
        [cutoff.to_rfc3339()],
    )?;
    Ok(removed)
}

impl HistoryMirror for DbConnection {
    fn record(&self, alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>> {
        insert_alert(self, alert)?;
        Ok(())
    }
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let category: String = row.get(2)?;
    let severity: String = row.get(3)?;
    let source: String = row.get(6)?;

    Ok(Alert {
        id: row.get::<_, i64>(0)? as u64,
        label: SoundLabel::parse(&row.get::<_, String>(1)?),
        category: Category::parse(&category).ok_or_else(|| invalid(2, format!("category '{}'", category)))?,
        severity: Severity::parse(&severity).ok_or_else(|| invalid(3, format!("severity '{}'", severity)))?,
        location: row.get(4)?,
        confidence: row.get::<_, f64>(5)? as f32,
        source: ClassificationSource::parse(&source).ok_or_else(|| invalid(6, format!("source '{}'", source)))?,
        created_at: parse_time(row, 7)?,
    })
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn invalid(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}
