//! Block event records and where they go.

use std::fmt::Debug;
use std::net::IpAddr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Event type tag carried by every block record.
pub const BLOCK_EVENT_TYPE: &str = "scanguard_block";

/// Emitted once when an address enters the blocking state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Name of the guard instance.
    pub name: String,
    /// Blocked address.
    pub ip: IpAddr,
    /// Seconds between first contact and the block.
    pub find_seconds: u64,
    /// Configured block duration in seconds.
    pub block_seconds: u64,
    /// Requests seen from the address.
    pub total: u64,
    /// Scan-like responses seen for the address.
    pub err: u64,
}

impl BlockEvent {
    /// Create a block event with the standard type tag.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ip: IpAddr,
        find_seconds: u64,
        block_seconds: u64,
        total: u64,
        err: u64,
    ) -> Self {
        Self {
            event_type: BLOCK_EVENT_TYPE.to_string(),
            name: name.into(),
            ip,
            find_seconds,
            block_seconds,
            total,
            err,
        }
    }
}

/// Destination for block events.
///
/// Sinks must not fail the caller: by the time an event is recorded the
/// reject decision has already been made.
pub trait BlockEventSink: Send + Sync + Debug {
    /// Record a block event.
    fn record(&self, event: &BlockEvent);
}

/// Logs each event as a JSON line through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl BlockEventSink for TracingSink {
    fn record(&self, event: &BlockEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!(
                name = %event.name,
                ip = %event.ip,
                find_seconds = event.find_seconds,
                block_seconds = event.block_seconds,
                total = event.total,
                err = event.err,
                event = %json,
                "Blocking address"
            ),
            Err(e) => error!(ip = %event.ip, error = %e, "Failed to serialize block event"),
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<BlockEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<BlockEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockEventSink for MemorySink {
    fn record(&self, event: &BlockEvent) {
        self.events.lock().push(event.clone());
    }
}
