//! Aggregate counts over scans.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Number of rows (by insertion order) sampled for statistics.
pub const STATS_SAMPLE_LIMIT: u64 = 1000;

/// Status counts and success rate across the sampled scans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total: u64,
    pub completed: u64,
    pub processing: u64,
    pub failed: u64,
    pub pending: u64,
    /// Percentage of sampled scans that are `done`, rounded.
    pub success_rate: u64,
}

impl ScanStats {
    fn finish(mut self) -> Self {
        self.total = self.completed + self.processing + self.failed + self.pending;
        self.success_rate = if self.total == 0 {
            0
        } else {
            ((self.completed as f64 / self.total as f64) * 100.0).round() as u64
        };
        self
    }
}

/// Counts statuses over the first `sample_limit` scans by insertion order.
pub fn scan_stats(db: &Database, sample_limit: u64) -> Result<ScanStats, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM (
                SELECT status FROM scans ORDER BY rowid ASC LIMIT ?1
             ) GROUP BY status",
        )?;
        let rows = stmt.query_map(params![sample_limit.min(i64::MAX as u64) as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = ScanStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            match status.as_str() {
                "done" => stats.completed += count,
                "processing" => stats.processing += count,
                "error" => stats.failed += count,
                "pending" => stats.pending += count,
                other => {
                    return Err(DatabaseError::CorruptRow {
                        column: "status",
                        reason: format!("unknown status '{}'", other),
                    })
                }
            }
        }

        Ok(stats.finish())
    })
}
