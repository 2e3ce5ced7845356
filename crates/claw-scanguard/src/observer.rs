//! Attribution of response statuses to reputation entries.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::entry::ReputationEntry;

/// Whether a status counts as evidence of scanning (client-error class).
#[must_use]
pub fn is_scan_status(status: u16) -> bool {
    (400..=499).contains(&status)
}

#[derive(Debug)]
struct ObserverState {
    fired: AtomicBool,
    status: AtomicU16,
}

/// Watches the response of one forwarded request.
///
/// The first status written is attributed to the entry; later writes, from
/// this observer or any clone of it, are ignored. A response that never
/// writes a status is treated as an implicit success and not attributed.
#[derive(Debug, Clone)]
pub struct ResponseObserver {
    entry: Arc<ReputationEntry>,
    state: Arc<ObserverState>,
}

impl ResponseObserver {
    /// Bind an observer to the entry of a forwarded request.
    #[must_use]
    pub fn new(entry: Arc<ReputationEntry>) -> Self {
        Self {
            entry,
            state: Arc::new(ObserverState {
                fired: AtomicBool::new(false),
                status: AtomicU16::new(0),
            }),
        }
    }

    /// Record the response status.
    ///
    /// Returns `true` only for the call that was attributed.
    pub fn write_header(&self, status: u16) -> bool {
        if self.state.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.state.status.store(status, Ordering::Release);

        if is_scan_status(status) {
            let scans = self.entry.record_scan();
            trace!(status, scan_requests = scans, "Scan-like response recorded");
        }
        true
    }

    /// Status recorded by the first [`write_header`](Self::write_header).
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        if !self.state.fired.load(Ordering::Acquire) {
            return None;
        }
        match self.state.status.load(Ordering::Acquire) {
            0 => None,
            status => Some(status),
        }
    }

    /// The entry this observer reports to.
    #[must_use]
    pub fn entry(&self) -> &Arc<ReputationEntry> {
        &self.entry
    }
}
