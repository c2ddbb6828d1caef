use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::scan::{ScanRecord, ScanStatus};

/// What happened to a scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventKind {
    Created,
    Processing,
    Completed,
    Failed,
    Deleted,
}

impl ScanEventKind {
    /// Wire name, as used for the SSE `event:` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanEventKind::Created => "created",
            ScanEventKind::Processing => "processing",
            ScanEventKind::Completed => "completed",
            ScanEventKind::Failed => "failed",
            ScanEventKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ScanEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanEventKind::Created => write!(f, "Uploaded"),
            ScanEventKind::Processing => write!(f, "Extracting text"),
            ScanEventKind::Completed => write!(f, "Text extracted"),
            ScanEventKind::Failed => write!(f, "Extraction failed"),
            ScanEventKind::Deleted => write!(f, "Deleted"),
        }
    }
}

/// A change to a scan record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub scan_id: String,
    pub file_id: String,
    pub file_name: String,
    pub kind: ScanEventKind,
    /// Status after the change; `None` once the scan is deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanStatus>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(kind: ScanEventKind, scan: &ScanRecord) -> Self {
        Self {
            scan_id: scan.id.clone(),
            file_id: scan.file_id.clone(),
            file_name: scan.file_name.clone(),
            kind,
            status: (kind != ScanEventKind::Deleted).then_some(scan.status),
            message: format!("{}: {}", kind, scan.file_name),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(scan: &ScanRecord, error: &str) -> Self {
        Self {
            status: Some(ScanStatus::Error),
            error: Some(error.to_string()),
            ..Self::new(ScanEventKind::Failed, scan)
        }
    }

    pub fn completed(scan: &ScanRecord) -> Self {
        Self {
            status: Some(ScanStatus::Done),
            ..Self::new(ScanEventKind::Completed, scan)
        }
    }
}

/// Broadcasts scan events to any number of subscribers.
#[derive(Clone)]
pub struct ScanEventBroadcaster {
    sender: Arc<broadcast::Sender<ScanEvent>>,
}

impl ScanEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: ScanEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}

impl Default for ScanEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(status: ScanStatus) -> ScanRecord {
        let now = Utc::now();
        ScanRecord {
            id: "s1".into(),
            file_id: "f1".into(),
            file_name: "iep.pdf".into(),
            file_size: None,
            mime_type: None,
            user_id: None,
            raw_text: String::new(),
            status,
            error: None,
            generation: 1,
            created_at: now,
            updated_at: now,
            completed_at: None,
            iep_fields: None,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let broadcaster = ScanEventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(ScanEvent::new(
            ScanEventKind::Processing,
            &scan(ScanStatus::Processing),
        ));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ScanEventKind::Processing);
        assert_eq!(event.status, Some(ScanStatus::Processing));
        assert_eq!(event.message, "Extracting text: iep.pdf");
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = ScanEventBroadcaster::default();
        broadcaster.send(ScanEvent::completed(&scan(ScanStatus::Processing)));
    }

    #[test]
    fn test_failed_and_deleted_events() {
        let failed = ScanEvent::failed(&scan(ScanStatus::Processing), "API down");
        assert_eq!(failed.status, Some(ScanStatus::Error));
        assert_eq!(failed.error.as_deref(), Some("API down"));

        let deleted = ScanEvent::new(ScanEventKind::Deleted, &scan(ScanStatus::Done));
        assert!(deleted.status.is_none());
        let json = serde_json::to_value(&deleted).unwrap();
        assert_eq!(json["kind"], deleted.kind.as_str());
        assert!(json.get("status").is_none());
    }
}
