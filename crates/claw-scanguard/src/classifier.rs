//! Per-request classification state machine.
//!
//! States are derived from the address's [`ReputationEntry`]:
//!
//! - **Unknown**: no entry yet.
//! - **Observing**: entry exists and is not blocking.
//! - **Blocking**: entry is blocking; requests are rejected.
//! - **Unblocking**: a blocking entry that stayed quiet for longer than the
//!   block duration. It returns to Observing during the same evaluation.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::address::{is_loopback, is_private, parse_client_ip};
use crate::allowlist::AllowListMatcher;
use crate::clock::{Clock, SystemClock};
use crate::config::ScanGuardConfig;
use crate::entry::ReputationEntry;
use crate::error::ScanGuardResult;
use crate::event::{BlockEvent, BlockEventSink, TracingSink};
use crate::observer::ResponseObserver;
use crate::store::ReputationStore;

/// Why a request skipped classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// The claimed address could not be parsed.
    Unparsable,
    /// Loopback traffic.
    Loopback,
    /// Private-range traffic while private blocking is disabled.
    Private,
    /// The address is on the allow list.
    AllowListed,
}

/// Outcome of classifying one request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Pass the request through untouched; nothing was recorded.
    Bypass(BypassReason),
    /// Forward the request and report its response status to the observer.
    Forward(ResponseObserver),
    /// Reject the request.
    Reject,
}

impl Decision {
    /// Check if the request bypassed classification.
    #[must_use]
    pub const fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass(_))
    }

    /// Check if the request is forwarded and observed.
    #[must_use]
    pub const fn is_forward(&self) -> bool {
        matches!(self, Self::Forward(_))
    }

    /// Check if the request is rejected.
    #[must_use]
    pub const fn is_reject(&self) -> bool {
        matches!(self, Self::Reject)
    }

    /// The response observer, for forwarded requests.
    #[must_use]
    pub fn observer(&self) -> Option<&ResponseObserver> {
        match self {
            Self::Forward(observer) => Some(observer),
            _ => None,
        }
    }
}

/// Limits an address must reach before it is blocked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum scan-like responses.
    pub min_scan_requests: u64,
    /// Minimum total requests.
    pub min_total_requests: u64,
    /// Minimum percentage of scan-like responses.
    pub min_scan_percent: f64,
    /// Seconds of quiet after which a block is lifted.
    pub block_seconds: u64,
}

impl Thresholds {
    /// Extract thresholds from a configuration.
    #[must_use]
    pub const fn from_config(config: &ScanGuardConfig) -> Self {
        Self {
            min_scan_requests: config.min_scan_requests,
            min_total_requests: config.min_total_requests,
            min_scan_percent: config.min_scan_percent,
            block_seconds: config.block_seconds,
        }
    }

    /// Whether the counters justify a block.
    ///
    /// Every minimum is inclusive: reaching it exactly is enough.
    #[must_use]
    pub fn reached(&self, scan_requests: u64, total_requests: u64) -> bool {
        if scan_requests < self.min_scan_requests {
            return false;
        }
        if total_requests < self.min_total_requests {
            return false;
        }
        // No ratio without traffic.
        if total_requests == 0 {
            return false;
        }
        let percent = (scan_requests as f64 / total_requests as f64) * 100.0;
        percent >= self.min_scan_percent
    }

    fn block_secs_i64(&self) -> i64 {
        i64::try_from(self.block_seconds).unwrap_or(i64::MAX)
    }
}

/// Decides, per request, whether to bypass, forward or reject.
#[derive(Debug)]
pub struct Classifier {
    /// Instance name for block events.
    name: String,
    /// Block thresholds.
    thresholds: Thresholds,
    /// Classify private-range addresses too.
    block_private: bool,
    /// Exempt addresses.
    allow_list: AllowListMatcher,
    /// Reputation entries.
    store: Arc<ReputationStore>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Block event destination.
    sink: Arc<dyn BlockEventSink>,
}

impl Classifier {
    /// Create a classifier from configuration.
    ///
    /// Unset values are defaulted first. Fails on an invalid option or allow
    /// list entry.
    pub fn new(config: &ScanGuardConfig) -> ScanGuardResult<Self> {
        let config = config.clone().normalized();
        config.validate()?;
        let allow_list = AllowListMatcher::new(&config.ip_allow_list)?;

        Ok(Self {
            name: config.name.clone(),
            thresholds: Thresholds::from_config(&config),
            block_private: config.block_private,
            allow_list,
            store: Arc::new(ReputationStore::new(config.remember_seconds)),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        })
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send block events somewhere else.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn BlockEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Classify a request by its claimed client address.
    ///
    /// An unparsable address is bypassed rather than rejected.
    pub fn classify(&self, raw: &str) -> Decision {
        match parse_client_ip(raw) {
            Some(ip) => self.classify_ip(ip),
            None => {
                debug!(address = %raw, "Unparsable client address, bypassing");
                Decision::Bypass(BypassReason::Unparsable)
            }
        }
    }

    /// Classify a request from an already parsed address.
    pub fn classify_ip(&self, ip: IpAddr) -> Decision {
        let ip = ip.to_canonical();

        if let Some(reason) = self.bypass_reason(&ip) {
            trace!(ip = %ip, reason = ?reason, "Bypassing classification");
            return Decision::Bypass(reason);
        }

        let now = self.clock.now();
        let (entry, previous_seen) = self.store.touch_or_create(&ip, now);

        if entry.is_blocking() {
            let quiet_for = now.saturating_sub(previous_seen);
            if quiet_for > self.thresholds.block_secs_i64() {
                if entry.stop_blocking() {
                    info!(ip = %ip, quiet_secs = quiet_for, "Unblocking address");
                }
                return Self::forward(&ip, entry);
            }

            trace!(ip = %ip, "Rejecting blocked address");
            return Decision::Reject;
        }

        let scans = entry.scan_requests();
        let total = entry.total_requests();
        if !self.thresholds.reached(scans, total) {
            return Self::forward(&ip, entry);
        }

        if entry.start_blocking() {
            let find_seconds = now.saturating_sub(entry.first_seen()).max(0) as u64;
            let event = BlockEvent::new(
                self.name.clone(),
                ip,
                find_seconds,
                self.thresholds.block_seconds,
                total,
                scans,
            );
            self.sink.record(&event);
        }

        Decision::Reject
    }

    fn bypass_reason(&self, ip: &IpAddr) -> Option<BypassReason> {
        if is_loopback(ip) {
            return Some(BypassReason::Loopback);
        }
        if !self.block_private && is_private(ip) {
            return Some(BypassReason::Private);
        }
        if self.allow_list.matches(ip) {
            return Some(BypassReason::AllowListed);
        }
        None
    }

    fn forward(ip: &IpAddr, entry: Arc<ReputationEntry>) -> Decision {
        let total = entry.record_request();
        trace!(ip = %ip, total_requests = total, "Forwarding request");
        Decision::Forward(ResponseObserver::new(entry))
    }

    /// The reputation store.
    #[must_use]
    pub const fn store(&self) -> &Arc<ReputationStore> {
        &self.store
    }

    /// The time source.
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The allow list.
    #[must_use]
    pub const fn allow_list(&self) -> &AllowListMatcher {
        &self.allow_list
    }

    /// The block thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// The instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
