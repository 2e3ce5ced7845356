//! Error types for scan guarding.

use thiserror::Error;

/// Errors that can occur while building or configuring a scan guard.
///
/// Classification itself never fails: malformed input degrades to a bypass.
#[derive(Debug, Error)]
pub enum ScanGuardError {
    /// An allow list entry is neither an address nor a CIDR range.
    #[error("Invalid allow list entry {entry:?}: {reason}")]
    InvalidAllowListEntry {
        /// The offending entry as configured.
        entry: String,
        /// Why the range parse rejected it.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a configuration document.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for scan guard operations.
pub type ScanGuardResult<T> = Result<T, ScanGuardError>;
