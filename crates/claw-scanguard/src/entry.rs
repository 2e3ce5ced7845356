//! Per-address reputation record.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Traffic counters and block state for one address.
///
/// Every field is an independent atomic. No operation needs more than one
/// field to change together, so concurrent requests share an entry without
/// locking it.
#[derive(Debug)]
pub struct ReputationEntry {
    /// Requests attributed to this address.
    total_requests: AtomicU64,
    /// Requests whose response was in the client-error class.
    scan_requests: AtomicU64,
    /// Unix seconds of the first request.
    first_seen: AtomicI64,
    /// Unix seconds of the most recent request.
    last_seen: AtomicI64,
    /// Whether the address is currently rejected.
    blocking: AtomicBool,
}

/// Point-in-time copy of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Requests attributed to this address.
    pub total_requests: u64,
    /// Requests with a client-error response.
    pub scan_requests: u64,
    /// Unix seconds of the first request.
    pub first_seen: i64,
    /// Unix seconds of the most recent request.
    pub last_seen: i64,
    /// Whether the address is currently rejected.
    pub blocking: bool,
}

impl ReputationEntry {
    /// Create an entry first seen at `now`.
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            scan_requests: AtomicU64::new(0),
            first_seen: AtomicI64::new(now),
            last_seen: AtomicI64::new(now),
            blocking: AtomicBool::new(false),
        }
    }

    /// Requests attributed to this address.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Acquire)
    }

    /// Requests with a client-error response.
    #[must_use]
    pub fn scan_requests(&self) -> u64 {
        self.scan_requests.load(Ordering::Acquire)
    }

    /// Unix seconds of the first request.
    #[must_use]
    pub fn first_seen(&self) -> i64 {
        self.first_seen.load(Ordering::Acquire)
    }

    /// Unix seconds of the most recent request.
    #[must_use]
    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Acquire)
    }

    /// Whether the address is currently rejected.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.blocking.load(Ordering::Acquire)
    }

    /// Count one forwarded request.
    pub fn record_request(&self) -> u64 {
        self.total_requests.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one scan-like response.
    ///
    /// Only the response observer calls this, after the matching
    /// [`record_request`](Self::record_request), which keeps
    /// `scan_requests <= total_requests`.
    pub(crate) fn record_scan(&self) -> u64 {
        self.scan_requests.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Mark the address as seen at `now` and return the previous `last_seen`.
    ///
    /// Never moves `last_seen` backwards when concurrent callers race with
    /// slightly different clocks.
    pub fn touch(&self, now: i64) -> i64 {
        self.last_seen.fetch_max(now, Ordering::AcqRel)
    }

    /// Flip into the blocking state. Returns `true` for the single caller that
    /// performed the transition.
    pub(crate) fn start_blocking(&self) -> bool {
        self.blocking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flip out of the blocking state. Returns `true` for the single caller
    /// that performed the transition.
    pub(crate) fn stop_blocking(&self) -> bool {
        self.blocking
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the entry has been idle longer than `remember_secs` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: i64, remember_secs: u64) -> bool {
        let horizon = i64::try_from(remember_secs).unwrap_or(i64::MAX);
        now.saturating_sub(self.last_seen()) > horizon
    }

    /// Copy the current field values.
    #[must_use]
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            total_requests: self.total_requests(),
            scan_requests: self.scan_requests(),
            first_seen: self.first_seen(),
            last_seen: self.last_seen(),
            blocking: self.is_blocking(),
        }
    }
}
