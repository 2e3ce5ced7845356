//! Scan guard configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::DEFAULT_IP_HEADER;
use crate::allowlist::AllowListMatcher;
use crate::error::{ScanGuardError, ScanGuardResult};

/// Default 4xx responses required before an address can be blocked.
pub const DEFAULT_MIN_SCAN_REQUESTS: u64 = 10;
/// Default scan-response percentage required to block.
pub const DEFAULT_MIN_SCAN_PERCENT: f64 = 25.0;
/// Default block duration (10 minutes).
pub const DEFAULT_BLOCK_SECONDS: u64 = 600;
/// Default retention for idle entries (6 hours).
pub const DEFAULT_REMEMBER_SECONDS: u64 = 6 * 3600;
/// Default status for the fixed rejection strategy.
pub const DEFAULT_REJECT_STATUS: u16 = 403;
/// Default period of the background sweeper.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
/// Default instance name.
pub const DEFAULT_NAME: &str = "scanguard";
/// Largest accepted value for the `*Seconds` options.
///
/// Timestamps are signed Unix seconds, so longer spans cannot be compared
/// against them.
pub const MAX_SECONDS: u64 = i64::MAX as u64;

/// Configuration for a [`ScanGuard`](crate::ScanGuard).
///
/// Keys use camelCase when (de)serialized, e.g. `minScanRequests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanGuardConfig {
    /// Instance name carried in block events.
    pub name: String,
    /// Trusted header carrying the client address.
    pub ip_header: String,
    /// Minimum scan-like responses before blocking is possible.
    pub min_scan_requests: u64,
    /// Minimum total requests before blocking is possible (0 disables).
    pub min_total_requests: u64,
    /// Minimum percentage of scan-like responses required to block.
    pub min_scan_percent: f64,
    /// Whether private-range addresses are classified at all.
    pub block_private: bool,
    /// How long an address stays blocked after its last request.
    pub block_seconds: u64,
    /// How long an idle address is remembered.
    pub remember_seconds: u64,
    /// Addresses and CIDR ranges exempt from classification.
    pub ip_allow_list: Vec<String>,
    /// Answer blocked requests with random 4xx statuses or dropped connections.
    pub play_games: bool,
    /// Status used when not playing games.
    pub reject_status: u16,
    /// Period of the background sweeper.
    pub sweep_interval_seconds: u64,
}

impl Default for ScanGuardConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            ip_header: DEFAULT_IP_HEADER.to_string(),
            min_scan_requests: DEFAULT_MIN_SCAN_REQUESTS,
            min_total_requests: 0,
            min_scan_percent: DEFAULT_MIN_SCAN_PERCENT,
            block_private: false,
            block_seconds: DEFAULT_BLOCK_SECONDS,
            remember_seconds: DEFAULT_REMEMBER_SECONDS,
            ip_allow_list: Vec::new(),
            play_games: false,
            reject_status: DEFAULT_REJECT_STATUS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl ScanGuardConfig {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> ScanGuardConfigBuilder {
        ScanGuardConfigBuilder::default()
    }

    /// Parse a JSON document, then normalize and validate it.
    pub fn from_json_str(json: &str) -> ScanGuardResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> ScanGuardResult<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading scan guard configuration");
        Self::from_json_str(&content)
    }

    /// Replace unset (zero or empty) values with their defaults.
    #[must_use]
    #[allow(clippy::float_cmp)] // exact zero means unset
    pub fn normalized(mut self) -> Self {
        if self.min_scan_requests == 0 {
            debug!(default = DEFAULT_MIN_SCAN_REQUESTS, "minScanRequests unset, using default");
            self.min_scan_requests = DEFAULT_MIN_SCAN_REQUESTS;
        }
        if self.min_scan_percent == 0.0 {
            debug!(default = DEFAULT_MIN_SCAN_PERCENT, "minScanPercent unset, using default");
            self.min_scan_percent = DEFAULT_MIN_SCAN_PERCENT;
        }
        if self.block_seconds == 0 {
            debug!(default = DEFAULT_BLOCK_SECONDS, "blockSeconds unset, using default");
            self.block_seconds = DEFAULT_BLOCK_SECONDS;
        }
        if self.remember_seconds == 0 {
            debug!(default = DEFAULT_REMEMBER_SECONDS, "rememberSeconds unset, using default");
            self.remember_seconds = DEFAULT_REMEMBER_SECONDS;
        }
        if self.sweep_interval_seconds == 0 {
            self.sweep_interval_seconds = DEFAULT_SWEEP_INTERVAL_SECONDS;
        }
        if self.reject_status == 0 {
            self.reject_status = DEFAULT_REJECT_STATUS;
        }
        if self.name.trim().is_empty() {
            self.name = DEFAULT_NAME.to_string();
        }
        if self.ip_header.trim().is_empty() {
            self.ip_header = DEFAULT_IP_HEADER.to_string();
        }
        self
    }

    /// Check option ranges and the allow list.
    pub fn validate(&self) -> ScanGuardResult<()> {
        if !(self.min_scan_percent > 0.0 && self.min_scan_percent <= 100.0) {
            return Err(ScanGuardError::Config(format!(
                "minScanPercent ({}) must be in (0, 100]",
                self.min_scan_percent
            )));
        }

        if !(400..=599).contains(&self.reject_status) {
            return Err(ScanGuardError::Config(format!(
                "rejectStatus ({}) must be a 4xx or 5xx status",
                self.reject_status
            )));
        }

        for (option, value) in [
            ("blockSeconds", self.block_seconds),
            ("rememberSeconds", self.remember_seconds),
            ("sweepIntervalSeconds", self.sweep_interval_seconds),
        ] {
            if value > MAX_SECONDS {
                return Err(ScanGuardError::Config(format!(
                    "{option} ({value}) must be <= {MAX_SECONDS}"
                )));
            }
        }

        if self.remember_seconds < self.block_seconds {
            return Err(ScanGuardError::Config(format!(
                "rememberSeconds ({}) must be >= blockSeconds ({})",
                self.remember_seconds, self.block_seconds
            )));
        }

        AllowListMatcher::new(&self.ip_allow_list)?;

        Ok(())
    }

    /// Block duration.
    #[must_use]
    pub const fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_seconds)
    }

    /// Retention for idle entries.
    #[must_use]
    pub const fn remember_duration(&self) -> Duration {
        Duration::from_secs(self.remember_seconds)
    }

    /// Period of the background sweeper.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Builder for [`ScanGuardConfig`].
#[derive(Debug, Clone, Default)]
pub struct ScanGuardConfigBuilder {
    config: ScanGuardConfig,
}

impl ScanGuardConfigBuilder {
    /// Set the instance name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the client address header.
    #[must_use]
    pub fn ip_header(mut self, header: impl Into<String>) -> Self {
        self.config.ip_header = header.into();
        self
    }

    /// Set the minimum number of scan-like responses.
    #[must_use]
    pub const fn min_scan_requests(mut self, count: u64) -> Self {
        self.config.min_scan_requests = count;
        self
    }

    /// Set the minimum number of total requests.
    #[must_use]
    pub const fn min_total_requests(mut self, count: u64) -> Self {
        self.config.min_total_requests = count;
        self
    }

    /// Set the minimum scan-response percentage.
    #[must_use]
    pub const fn min_scan_percent(mut self, percent: f64) -> Self {
        self.config.min_scan_percent = percent;
        self
    }

    /// Classify private-range addresses too.
    #[must_use]
    pub const fn block_private(mut self, enabled: bool) -> Self {
        self.config.block_private = enabled;
        self
    }

    /// Set the block duration in seconds.
    #[must_use]
    pub const fn block_seconds(mut self, secs: u64) -> Self {
        self.config.block_seconds = secs;
        self
    }

    /// Set the idle retention in seconds.
    #[must_use]
    pub const fn remember_seconds(mut self, secs: u64) -> Self {
        self.config.remember_seconds = secs;
        self
    }

    /// Exempt an address or CIDR range.
    #[must_use]
    pub fn allow(mut self, entry: impl Into<String>) -> Self {
        self.config.ip_allow_list.push(entry.into());
        self
    }

    /// Enable randomized rejections.
    #[must_use]
    pub const fn play_games(mut self, enabled: bool) -> Self {
        self.config.play_games = enabled;
        self
    }

    /// Set the fixed rejection status.
    #[must_use]
    pub const fn reject_status(mut self, status: u16) -> Self {
        self.config.reject_status = status;
        self
    }

    /// Set the sweeper period in seconds.
    #[must_use]
    pub const fn sweep_interval_seconds(mut self, secs: u64) -> Self {
        self.config.sweep_interval_seconds = secs;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ScanGuardConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScanGuardConfig::default();

        assert_eq!(config.name, "scanguard");
        assert_eq!(config.ip_header, "X-Real-Ip");
        assert_eq!(config.min_scan_requests, 10);
        assert_eq!(config.min_total_requests, 0);
        assert!((config.min_scan_percent - 25.0).abs() < f64::EPSILON);
        assert!(!config.block_private);
        assert_eq!(config.block_seconds, 600);
        assert_eq!(config.remember_seconds, 21_600);
        assert!(config.ip_allow_list.is_empty());
        assert!(!config.play_games);
        assert_eq!(config.reject_status, 403);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ScanGuardConfig::builder()
            .name("edge")
            .min_scan_requests(2)
            .min_total_requests(4)
            .min_scan_percent(50.0)
            .block_private(true)
            .allow("10.0.0.0/8")
            .build();

        assert_eq!(config.name, "edge");
        assert_eq!(config.min_scan_requests, 2);
        assert_eq!(config.min_total_requests, 4);
        assert!(config.block_private);
        assert_eq!(config.ip_allow_list, vec!["10.0.0.0/8".to_string()]);
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let config = ScanGuardConfig {
            min_scan_requests: 0,
            min_scan_percent: 0.0,
            block_seconds: 0,
            remember_seconds: 0,
            sweep_interval_seconds: 0,
            reject_status: 0,
            name: String::new(),
            ip_header: " ".into(),
            ..ScanGuardConfig::default()
        }
        .normalized();

        assert_eq!(config, ScanGuardConfig::default());
    }

    #[test]
    fn test_from_json_uses_camel_case_and_defaults() {
        let json = r#"{
            "minScanRequests": 5,
            "minTotalRequests": 20,
            "blockPrivate": true,
            "ipAllowList": ["192.0.2.1", "10.0.0.0/8"],
            "playGames": true
        }"#;

        let config = ScanGuardConfig::from_json_str(json).unwrap();
        assert_eq!(config.min_scan_requests, 5);
        assert_eq!(config.min_total_requests, 20);
        assert!(config.block_private);
        assert!(config.play_games);
        assert_eq!(config.ip_allow_list.len(), 2);
        assert_eq!(config.block_seconds, DEFAULT_BLOCK_SECONDS);
    }

    #[test]
    fn test_from_json_explicit_zero_is_default() {
        let config = ScanGuardConfig::from_json_str(r#"{"minScanRequests": 0}"#).unwrap();
        assert_eq!(config.min_scan_requests, DEFAULT_MIN_SCAN_REQUESTS);
    }

    #[test]
    fn test_from_json_rejects_bad_allow_list() {
        let result = ScanGuardConfig::from_json_str(r#"{"ipAllowList": ["10.0.0.0/99"]}"#);
        assert!(matches!(result, Err(ScanGuardError::InvalidAllowListEntry { .. })));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let result = ScanGuardConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ScanGuardError::Parse(_))));
    }

    #[test]
    fn test_validate_percent_range() {
        let config = ScanGuardConfig::builder().min_scan_percent(150.0).build();
        assert!(matches!(config.validate(), Err(ScanGuardError::Config(_))));

        let config = ScanGuardConfig::builder().min_scan_percent(f64::NAN).build();
        assert!(config.validate().is_err());

        let config = ScanGuardConfig::builder().min_scan_percent(100.0).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reject_status() {
        let config = ScanGuardConfig::builder().reject_status(200).build();
        assert!(config.validate().is_err());

        let config = ScanGuardConfig::builder().reject_status(429).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_remember_not_shorter_than_block() {
        let config = ScanGuardConfig::builder()
            .block_seconds(600)
            .remember_seconds(300)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_seconds_beyond_timestamp_range() {
        let config = ScanGuardConfig::builder()
            .block_seconds(u64::MAX)
            .remember_seconds(u64::MAX)
            .build();
        assert!(matches!(config.validate(), Err(ScanGuardError::Config(_))));

        let config = ScanGuardConfig::builder()
            .block_seconds(600)
            .remember_seconds(1 << 63)
            .build();
        assert!(config.validate().is_err());

        let config = ScanGuardConfig::builder()
            .block_seconds(MAX_SECONDS)
            .remember_seconds(MAX_SECONDS)
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_rejects_huge_durations() {
        let json = format!(
            r#"{{"minScanRequests": 1, "blockSeconds": {max}, "rememberSeconds": {max}}}"#,
            max = u64::MAX
        );
        let result = ScanGuardConfig::from_json_str(&json);
        assert!(matches!(result, Err(ScanGuardError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "edge", "blockSeconds": 120}}"#).unwrap();

        let config = ScanGuardConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "edge");
        assert_eq!(config.block_seconds, 120);
        assert_eq!(config.block_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ScanGuardConfig::load(Path::new("/nonexistent/scanguard.json"));
        assert!(matches!(result, Err(ScanGuardError::Io(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = ScanGuardConfig::builder().name("edge").allow("::1").build();
        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains("\"minScanRequests\""));
        assert_eq!(ScanGuardConfig::from_json_str(&json).unwrap(), config);
    }
}
