//! Request-pipeline facade over the classifier.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::address::header_value;
use crate::classifier::{Classifier, Decision};
use crate::clock::Clock;
use crate::config::ScanGuardConfig;
use crate::entry::EntrySnapshot;
use crate::error::ScanGuardResult;
use crate::event::BlockEventSink;
use crate::observer::ResponseObserver;
use crate::rejection::{strategy_from_config, Rejection, RejectionStrategy};
use crate::sweeper::spawn_sweeper;

/// What the request pipeline should do with a request.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Pass the request through without observing it.
    Bypass,
    /// Forward the request and report the response status to the observer.
    Forward(ResponseObserver),
    /// Answer the request as described instead of forwarding it.
    Reject(Rejection),
}

impl Verdict {
    /// Check if the request passes through untouched.
    #[must_use]
    pub const fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }

    /// Check if the request is forwarded and observed.
    #[must_use]
    pub const fn is_forward(&self) -> bool {
        matches!(self, Self::Forward(_))
    }

    /// Check if the request is rejected.
    #[must_use]
    pub const fn is_reject(&self) -> bool {
        matches!(self, Self::Reject(_))
    }
}

/// Scan blocking for a request pipeline.
///
/// Combines the classifier with the configured rejection strategy and owns
/// entry reclamation.
#[derive(Debug)]
pub struct ScanGuard {
    /// Configuration.
    config: ScanGuardConfig,
    /// Decision state machine.
    classifier: Classifier,
    /// Answer for rejected requests.
    rejection: Box<dyn RejectionStrategy>,
}

impl ScanGuard {
    /// Create a guard from configuration.
    ///
    /// Unset values are defaulted before validation. Fails on an invalid
    /// option or allow list entry.
    pub fn new(config: ScanGuardConfig) -> ScanGuardResult<Self> {
        let config = config.normalized();
        config.validate()?;

        let classifier = Classifier::new(&config)?;
        let rejection = strategy_from_config(&config);

        info!(
            name = %config.name,
            min_scan_requests = config.min_scan_requests,
            min_total_requests = config.min_total_requests,
            min_scan_percent = config.min_scan_percent,
            block_private = config.block_private,
            block_seconds = config.block_seconds,
            remember_seconds = config.remember_seconds,
            allow_list_entries = classifier.allow_list().len(),
            play_games = config.play_games,
            "Scan guard created"
        );

        Ok(Self {
            config,
            classifier,
            rejection,
        })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> ScanGuardResult<Self> {
        Self::new(ScanGuardConfig::default())
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.classifier = self.classifier.with_clock(clock);
        self
    }

    /// Send block events somewhere else.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn BlockEventSink>) -> Self {
        self.classifier = self.classifier.with_sink(sink);
        self
    }

    /// Answer rejected requests with a different strategy.
    #[must_use]
    pub fn with_rejection(mut self, rejection: Box<dyn RejectionStrategy>) -> Self {
        self.rejection = rejection;
        self
    }

    // ==================== Main Check Methods ====================

    /// Check a request by its headers.
    ///
    /// The client address is read from the configured header. A missing or
    /// malformed header bypasses the guard.
    pub fn check(&self, headers: &HashMap<String, String>) -> Verdict {
        self.check_address(header_value(headers, &self.config.ip_header))
    }

    /// Check a request by its raw client address header value.
    pub fn check_address(&self, address: Option<&str>) -> Verdict {
        let Some(address) = address else {
            debug!(header = %self.config.ip_header, "No client address header, bypassing");
            return Verdict::Bypass;
        };

        self.verdict(self.classifier.classify(address))
    }

    /// Check a request from an already parsed client address.
    pub fn check_ip(&self, ip: IpAddr) -> Verdict {
        self.verdict(self.classifier.classify_ip(ip))
    }

    fn verdict(&self, decision: Decision) -> Verdict {
        match decision {
            Decision::Bypass(_) => Verdict::Bypass,
            Decision::Forward(observer) => Verdict::Forward(observer),
            Decision::Reject => Verdict::Reject(self.rejection.reject()),
        }
    }

    // ==================== Maintenance ====================

    /// Remove idle entries now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.classifier.store().sweep(self.classifier.clock().now())
    }

    /// Start the background sweeper on the current tokio runtime.
    pub fn spawn_sweeper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        spawn_sweeper(
            Arc::clone(self.classifier.store()),
            Arc::clone(self.classifier.clock()),
            self.config.sweep_interval(),
            shutdown,
        )
    }

    /// Lift the block on an address and forget its history.
    pub fn forget(&self, ip: &IpAddr) -> bool {
        let removed = self.classifier.store().remove(&ip.to_canonical());
        if removed {
            info!(ip = %ip, "Reputation entry forgotten");
        }
        removed
    }

    // ==================== Statistics ====================

    /// Number of tracked addresses.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.classifier.store().len()
    }

    /// Number of addresses currently blocked.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.classifier.store().blocked_count()
    }

    /// Current state of an address, if tracked.
    #[must_use]
    pub fn snapshot(&self, ip: &IpAddr) -> Option<EntrySnapshot> {
        self.classifier.store().snapshot(&ip.to_canonical())
    }

    // ==================== Configuration Access ====================

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ScanGuardConfig {
        &self.config
    }

    /// Get a reference to the classifier.
    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ScanGuardError;
    use crate::event::MemorySink;
    use crate::rejection::FixedRejection;

    fn headers(name: &str, value: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(name.to_string(), value.to_string());
        headers
    }

    fn guard(config: ScanGuardConfig) -> (ScanGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let guard = ScanGuard::new(config)
            .unwrap()
            .with_clock(clock.clone())
            .with_sink(Arc::new(MemorySink::new()));
        (guard, clock)
    }

    #[test]
    fn test_guard_new_rejects_bad_allow_list() {
        let config = ScanGuardConfig::builder().allow("nope").build();
        let result = ScanGuard::new(config);
        assert!(matches!(result, Err(ScanGuardError::InvalidAllowListEntry { .. })));
    }

    #[test]
    fn test_guard_new_normalizes_zeroes() {
        let config = ScanGuardConfig::builder()
            .min_scan_requests(0)
            .block_seconds(0)
            .build();
        let guard = ScanGuard::new(config).unwrap();

        assert_eq!(guard.config().min_scan_requests, 10);
        assert_eq!(guard.config().block_seconds, 600);
    }

    #[test]
    fn test_with_defaults() {
        let guard = ScanGuard::with_defaults().unwrap();
        assert_eq!(guard.tracked_count(), 0);
        assert_eq!(guard.blocked_count(), 0);
    }

    #[test]
    fn test_check_reads_configured_header() {
        let (guard, _) = guard(ScanGuardConfig::default());

        assert!(guard.check(&headers("x-real-ip", "203.0.113.5")).is_forward());
        assert_eq!(guard.tracked_count(), 1);
    }

    #[test]
    fn test_check_custom_header() {
        let (guard, _) = guard(ScanGuardConfig::builder().ip_header("CF-Connecting-IP").build());

        assert!(guard.check(&headers("X-Real-Ip", "203.0.113.5")).is_bypass());
        assert!(guard.check(&headers("cf-connecting-ip", "203.0.113.5")).is_forward());
    }

    #[test]
    fn test_missing_or_malformed_header_bypasses() {
        let (guard, _) = guard(ScanGuardConfig::default());

        assert!(guard.check(&HashMap::new()).is_bypass());
        assert!(guard.check(&headers("X-Real-Ip", "garbage")).is_bypass());
        assert!(guard.check_address(None).is_bypass());
        assert_eq!(guard.tracked_count(), 0);
    }

    #[test]
    fn test_chained_header_cannot_blame_another_address() {
        let config = ScanGuardConfig::builder()
            .ip_header("X-Forwarded-For")
            .min_scan_requests(1)
            .build();
        let (guard, _) = guard(config);
        let chained = headers("X-Forwarded-For", "198.51.100.77, 203.0.113.9");

        for _ in 0..5 {
            match guard.check(&chained) {
                Verdict::Bypass => {}
                other => panic!("expected Bypass, got {other:?}"),
            }
        }
        assert_eq!(guard.tracked_count(), 0);

        let named: IpAddr = "198.51.100.77".parse().unwrap();
        assert!(guard.check(&headers("X-Forwarded-For", "198.51.100.77")).is_forward());
        assert!(!guard.snapshot(&named).unwrap().blocking);
    }

    #[test]
    fn test_reject_uses_strategy() {
        let config = ScanGuardConfig::builder()
            .min_scan_requests(1)
            .reject_status(429)
            .build();
        let (guard, _) = guard(config);
        let addr = Some("203.0.113.5");

        match guard.check_address(addr) {
            Verdict::Forward(observer) => {
                observer.write_header(404);
            }
            other => panic!("expected Forward, got {other:?}"),
        }

        match guard.check_address(addr) {
            Verdict::Reject(rejection) => assert_eq!(rejection, Rejection::Status(429)),
            other => panic!("expected Reject, got {other:?}"),
        }
        assert_eq!(guard.blocked_count(), 1);
    }

    #[test]
    fn test_with_rejection_overrides_strategy() {
        let config = ScanGuardConfig::builder().min_scan_requests(1).build();
        let (guard, _) = guard(config);
        let guard = guard.with_rejection(Box::new(FixedRejection::new(451)));
        let ip: IpAddr = "203.0.113.5".parse().unwrap();

        if let Verdict::Forward(observer) = guard.check_ip(ip) {
            observer.write_header(400);
        }

        assert!(matches!(guard.check_ip(ip), Verdict::Reject(Rejection::Status(451))));
    }

    #[test]
    fn test_sweep_uses_clock() {
        let config = ScanGuardConfig::builder()
            .block_seconds(60)
            .remember_seconds(120)
            .build();
        let (guard, clock) = guard(config);

        guard.check_address(Some("203.0.113.5"));
        assert_eq!(guard.sweep(), 0);

        clock.advance(121);
        assert_eq!(guard.sweep(), 1);
        assert_eq!(guard.tracked_count(), 0);
    }

    #[test]
    fn test_forget_lifts_block() {
        let config = ScanGuardConfig::builder().min_scan_requests(1).build();
        let (guard, _) = guard(config);
        let ip: IpAddr = "203.0.113.5".parse().unwrap();

        if let Verdict::Forward(observer) = guard.check_ip(ip) {
            observer.write_header(404);
        }
        assert!(guard.check_ip(ip).is_reject());

        assert!(guard.forget(&ip));
        assert!(guard.snapshot(&ip).is_none());
        assert!(guard.check_ip(ip).is_forward());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_sweeper_and_shutdown() {
        let (guard, _) = guard(ScanGuardConfig::default());
        let (tx, rx) = watch::channel(false);

        let handle = guard.spawn_sweeper(rx);
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
