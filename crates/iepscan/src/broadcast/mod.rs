//! Live scan events for subscribers such as the SSE endpoint.

pub mod scan_events;

pub use scan_events::{ScanEvent, ScanEventBroadcaster, ScanEventKind};
