//! Scan record: one uploaded document and its extraction state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::iep::IepFields;

/// Returned by the extraction model when a document has no readable text.
pub const NO_TEXT_SENTINEL: &str = "NO_TEXT_FOUND";

/// Extraction status of a scan.
///
/// `pending → processing → done | error`; `error` and `done` can re-enter
/// `processing` through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        ScanStatus::Pending,
        ScanStatus::Processing,
        ScanStatus::Done,
        ScanStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Processing => "processing",
            ScanStatus::Done => "done",
            ScanStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Done | ScanStatus::Error)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown scan status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ScanStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "processing" => Ok(ScanStatus::Processing),
            "done" => Ok(ScanStatus::Done),
            "error" => Ok(ScanStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: String,
    pub file_id: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub raw_text: String,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Incremented every time the scan enters `processing`. Worker results
    /// carrying an older generation are discarded.
    pub generation: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iep_fields: Option<IepFields>,
}

impl ScanRecord {
    /// Extracted text length in thousands of characters, one decimal.
    pub fn text_kilochars(&self) -> f64 {
        let chars = self.raw_text.chars().count() as f64;
        (chars / 100.0).round() / 10.0
    }
}

/// Fields supplied when a scan is created.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub file_id: String,
    pub file_name: String,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    pub user_id: Option<String>,
    pub status: ScanStatus,
}

/// Formats a timestamp the way it is stored: RFC 3339, millisecond
/// precision, `Z` suffix, so string order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
