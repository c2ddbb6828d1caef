//! Schema migrations.
//!
//! Every applied step is recorded in `schema_migrations`. A step and its
//! bookkeeping row commit together, so a crash leaves the file at the last
//! fully applied version.

use rusqlite::{params, Connection, TransactionBehavior};

use super::error::DatabaseError;

/// One schema change.
struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// Column the step adds. If it is already there the SQL is skipped and
    /// only the version is recorded.
    adds_column: Option<(&'static str, &'static str)>,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_scans",
        sql: include_str!("sql/001_create_scans.sql"),
        adds_column: None,
    },
    Step {
        version: 2,
        name: "scans_iep_fields",
        sql: include_str!("sql/002_add_iep_fields.sql"),
        adds_column: Some(("scans", "iep_fields")),
    },
];

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |s| s.version)
}

/// Highest version recorded in the database, 0 for a fresh file.
pub fn applied_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

/// Brings the schema up to [`latest_version`].
pub fn run_all(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )?;

    let from = applied_version(conn)?;
    for step in STEPS.iter().filter(|s| s.version > from) {
        apply(conn, step)?;
    }

    let to = applied_version(conn)?;
    if to != from {
        log::info!("Database schema migrated from v{} to v{}", from, to);
    }
    Ok(())
}

fn apply(conn: &mut Connection, step: &Step) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: step.version,
        reason: e.to_string(),
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(failed)?;

    let already_present = match step.adds_column {
        Some((table, column)) => has_column(&tx, table, column)?,
        None => false,
    };
    if already_present {
        log::debug!("Migration v{} ({}) already in place", step.version, step.name);
    } else {
        log::info!("Applying migration v{} ({})", step.version, step.name);
        tx.execute_batch(step.sql).map_err(failed)?;
    }

    tx.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
        params![step.version, step.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
