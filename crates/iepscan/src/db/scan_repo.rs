//! Scan repository: CRUD and guarded state transitions for the `scans` table.
//!
//! `file_id` is unique, so "the current scan for a file" is a single row.
//! Transitions are conditional `UPDATE`s; worker results additionally
//! require a matching `generation`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::iep::IepFields;
use crate::scan::{format_timestamp, NewScan, ScanRecord, ScanStatus};

const COLUMNS: &str = "id, file_id, file_name, file_size, mime_type, user_id, raw_text, status,
     error, generation, created_at, updated_at, completed_at, iep_fields";

/// A raw scan row as stored.
#[derive(Debug, Clone)]
struct ScanRow {
    id: String,
    file_id: String,
    file_name: String,
    file_size: Option<i64>,
    mime_type: Option<String>,
    user_id: Option<String>,
    raw_text: String,
    status: String,
    error: Option<String>,
    generation: i64,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
    iep_fields: Option<String>,
}

impl ScanRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_id: row.get("file_id")?,
            file_name: row.get("file_name")?,
            file_size: row.get("file_size")?,
            mime_type: row.get("mime_type")?,
            user_id: row.get("user_id")?,
            raw_text: row.get("raw_text")?,
            status: row.get("status")?,
            error: row.get("error")?,
            generation: row.get("generation")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
            iep_fields: row.get("iep_fields")?,
        })
    }

    fn into_record(self) -> Result<ScanRecord, DatabaseError> {
        let status = self
            .status
            .parse::<ScanStatus>()
            .map_err(|e| DatabaseError::CorruptRow {
                column: "status",
                reason: e.to_string(),
            })?;
        let iep_fields = match self.iep_fields {
            Some(json) => Some(serde_json::from_str::<IepFields>(&json).map_err(|e| {
                DatabaseError::CorruptRow {
                    column: "iep_fields",
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(ScanRecord {
            id: self.id,
            file_id: self.file_id,
            file_name: self.file_name,
            file_size: self.file_size.map(|s| s.max(0) as u64),
            mime_type: self.mime_type,
            user_id: self.user_id,
            raw_text: self.raw_text,
            status,
            error: self.error,
            generation: self.generation.max(0) as u32,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|ts| parse_timestamp("completed_at", ts))
                .transpose()?,
            iep_fields,
        })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            column,
            reason: format!("'{}': {}", value, e),
        })
}

/// Outcome of asking for an extraction to start.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// No scan exists for the file.
    Missing,
    /// The scan is already `processing` or `done`; nothing changed.
    AlreadyActive(ScanRecord),
    /// The scan moved to `processing` under a new generation.
    Started(ScanRecord),
}

/// Outcome of a user-initiated retry.
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Missing,
    InProgress,
    Reset(ScanRecord),
}

/// Query filter parameters for scan listing.
#[derive(Debug, Default, Clone)]
pub struct ScanFilter {
    pub status: Option<ScanStatus>,
    pub limit: u64,
    pub offset: u64,
}

/// Inserts a new scan and returns it as stored.
///
/// A scan created directly in `processing` starts at generation 1.
pub fn insert(db: &Database, scan: &NewScan, now: DateTime<Utc>) -> Result<ScanRecord, DatabaseError> {
    db.with_conn(|conn| insert_in(conn, scan, now))
}

fn insert_in(
    conn: &Connection,
    scan: &NewScan,
    now: DateTime<Utc>,
) -> Result<ScanRecord, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    let ts = format_timestamp(&now);
    let generation: i64 = if scan.status == ScanStatus::Processing {
        1
    } else {
        0
    };

    conn.execute(
        "INSERT INTO scans (id, file_id, file_name, file_size, mime_type, user_id, raw_text,
         status, error, generation, created_at, updated_at, completed_at, iep_fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '', ?7, NULL, ?8, ?9, ?9, NULL, NULL)",
        params![
            id,
            scan.file_id,
            scan.file_name,
            scan.file_size.map(|s| s as i64),
            scan.mime_type,
            scan.user_id,
            scan.status.as_str(),
            generation,
            ts,
        ],
    )
    .map_err(|e| DatabaseError::from_write(e, &format!("scan for file {} exists", scan.file_id)))?;

    find_in(conn, "id", &id)?.ok_or_else(|| DatabaseError::CorruptRow {
        column: "id",
        reason: format!("inserted scan {} not readable", id),
    })
}

/// Finds a scan by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ScanRecord>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, "id", id))
}

/// Finds the scan for a stored file.
pub fn find_by_file_id(db: &Database, file_id: &str) -> Result<Option<ScanRecord>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, "file_id", file_id))
}

fn find_in(
    conn: &Connection,
    column: &'static str,
    value: &str,
) -> Result<Option<ScanRecord>, DatabaseError> {
    let sql = format!("SELECT {} FROM scans WHERE {} = ?1", COLUMNS, column);
    let row = conn
        .query_row(&sql, params![value], ScanRow::from_row)
        .optional()?;
    row.map(ScanRow::into_record).transpose()
}

/// Moves the file's scan into `processing` unless it is already
/// `processing` or `done`.
pub fn begin_processing(
    db: &Database,
    file_id: &str,
    now: DateTime<Utc>,
) -> Result<TriggerOutcome, DatabaseError> {
    db.with_transaction(|tx| {
        let Some(existing) = find_in(tx, "file_id", file_id)? else {
            return Ok(TriggerOutcome::Missing);
        };

        match existing.status {
            ScanStatus::Processing | ScanStatus::Done => Ok(TriggerOutcome::AlreadyActive(existing)),
            ScanStatus::Pending | ScanStatus::Error => {
                Ok(TriggerOutcome::Started(restart(tx, &existing, now)?))
            }
        }
    })
}

/// Inserts a scan directly in `processing`, or, if one appeared for the
/// file in the meantime, applies [`begin_processing`] rules to it.
pub fn insert_processing(
    db: &Database,
    scan: &NewScan,
    now: DateTime<Utc>,
) -> Result<TriggerOutcome, DatabaseError> {
    db.with_transaction(|tx| {
        if let Some(existing) = find_in(tx, "file_id", &scan.file_id)? {
            return match existing.status {
                ScanStatus::Processing | ScanStatus::Done => {
                    Ok(TriggerOutcome::AlreadyActive(existing))
                }
                ScanStatus::Pending | ScanStatus::Error => {
                    Ok(TriggerOutcome::Started(restart(tx, &existing, now)?))
                }
            };
        }

        let scan = NewScan {
            status: ScanStatus::Processing,
            ..scan.clone()
        };
        Ok(TriggerOutcome::Started(insert_in(tx, &scan, now)?))
    })
}

/// Resets the file's scan to `processing` for another attempt. Refused
/// while an attempt is running.
pub fn reset_for_retry(
    db: &Database,
    file_id: &str,
    now: DateTime<Utc>,
) -> Result<RetryOutcome, DatabaseError> {
    db.with_transaction(|tx| {
        let Some(existing) = find_in(tx, "file_id", file_id)? else {
            return Ok(RetryOutcome::Missing);
        };

        if existing.status == ScanStatus::Processing {
            return Ok(RetryOutcome::InProgress);
        }

        Ok(RetryOutcome::Reset(restart(tx, &existing, now)?))
    })
}

/// Clears prior results and bumps the generation. The status guard makes
/// the update a no-op if the row changed since it was read.
fn restart(
    conn: &Connection,
    existing: &ScanRecord,
    now: DateTime<Utc>,
) -> Result<ScanRecord, DatabaseError> {
    let changed = conn.execute(
        "UPDATE scans SET status = 'processing', raw_text = '', error = NULL,
         completed_at = NULL, iep_fields = NULL, generation = generation + 1, updated_at = ?3
         WHERE id = ?1 AND status = ?2",
        params![existing.id, existing.status.as_str(), format_timestamp(&now)],
    )?;

    if changed == 0 {
        return Err(DatabaseError::Conflict(format!(
            "scan {} changed concurrently",
            existing.id
        )));
    }

    find_in(conn, "id", &existing.id)?.ok_or_else(|| DatabaseError::CorruptRow {
        column: "id",
        reason: format!("scan {} vanished during restart", existing.id),
    })
}

/// Stores extracted text and marks the attempt `done`.
///
/// Returns `false` when the attempt is stale (the scan was retried, deleted
/// or already finished), in which case nothing is written.
pub fn complete(
    db: &Database,
    id: &str,
    generation: u32,
    raw_text: &str,
    iep_fields: Option<&IepFields>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let fields_json = iep_fields
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::CorruptRow {
            column: "iep_fields",
            reason: e.to_string(),
        })?;
    let ts = format_timestamp(&now);

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE scans SET status = 'done', raw_text = ?3, error = NULL, iep_fields = ?4,
             completed_at = ?5, updated_at = ?5
             WHERE id = ?1 AND generation = ?2 AND status = 'processing'",
            params![id, generation as i64, raw_text, fields_json, ts],
        )?;
        Ok(changed == 1)
    })
}

/// Records a failed attempt. Same staleness rule as [`complete`].
pub fn fail(
    db: &Database,
    id: &str,
    generation: u32,
    message: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let ts = format_timestamp(&now);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE scans SET status = 'error', error = ?3, completed_at = ?4, updated_at = ?4
             WHERE id = ?1 AND generation = ?2 AND status = 'processing'",
            params![id, generation as i64, message, ts],
        )?;
        Ok(changed == 1)
    })
}

/// Lists scans newest first.
pub fn list(db: &Database, filter: &ScanFilter) -> Result<Vec<ScanRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let limit = filter.limit.min(i64::MAX as u64) as i64;
        let offset = filter.offset.min(i64::MAX as u64) as i64;

        let rows: Vec<ScanRow> = match filter.status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM scans WHERE status = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                    COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![status.as_str(), limit, offset], ScanRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM scans ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                    COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit, offset], ScanRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        rows.into_iter().map(ScanRow::into_record).collect()
    })
}

/// Scans in `processing`, oldest first.
pub fn list_processing(db: &Database) -> Result<Vec<ScanRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM scans WHERE status = 'processing' ORDER BY created_at, rowid",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ScanRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ScanRow::into_record).collect()
    })
}

/// Deletes a scan by ID, returning the deleted row.
pub fn delete_by_id(db: &Database, id: &str) -> Result<Option<ScanRecord>, DatabaseError> {
    delete_where(db, "id", id)
}

/// Deletes the scan for a stored file, returning the deleted row.
pub fn delete_by_file_id(db: &Database, file_id: &str) -> Result<Option<ScanRecord>, DatabaseError> {
    delete_where(db, "file_id", file_id)
}

fn delete_where(
    db: &Database,
    column: &'static str,
    value: &str,
) -> Result<Option<ScanRecord>, DatabaseError> {
    db.with_transaction(|tx| {
        let Some(existing) = find_in(tx, column, value)? else {
            return Ok(None);
        };
        tx.execute("DELETE FROM scans WHERE id = ?1", params![existing.id])?;
        Ok(Some(existing))
    })
}
