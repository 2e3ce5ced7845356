//! # claw-scanguard
//!
//! Scan blocking for Clawbernetes ingress traffic.
//!
//! Each request is attributed to its client address. For every address the
//! guard counts forwarded requests and the client-error (4xx) responses they
//! produced. Once an address has produced enough errors, and a large enough
//! share of its traffic was errors, it is blocked for a while.
//!
//! ## Components
//!
//! - [`AllowListMatcher`] - Addresses and CIDR ranges exempt from blocking
//! - [`ReputationStore`] - Concurrent per-address [`ReputationEntry`] map
//! - [`Classifier`] - Decision state machine (bypass / forward / reject)
//! - [`ResponseObserver`] - Attributes a forwarded request's status, once
//! - [`RejectionStrategy`] - What a rejected client gets to see
//! - [`ScanGuard`] - Facade for a request pipeline
//!
//! # Example
//!
//! ```rust
//! use claw_scanguard::{ScanGuard, ScanGuardConfig, Verdict};
//!
//! let guard = ScanGuard::new(ScanGuardConfig::default()).expect("valid config");
//!
//! match guard.check_address(Some("203.0.113.5")) {
//!     Verdict::Bypass => println!("not classified"),
//!     Verdict::Forward(observer) => {
//!         // ... forward the request, then report the backend's status:
//!         observer.write_header(404);
//!     }
//!     Verdict::Reject(rejection) => println!("rejected: {rejection:?}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod allowlist;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod guard;
pub mod observer;
pub mod rejection;
pub mod store;
pub mod sweeper;

// Re-export main types
pub use allowlist::AllowListMatcher;
pub use classifier::{BypassReason, Classifier, Decision, Thresholds};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ScanGuardConfig, ScanGuardConfigBuilder};
pub use entry::{EntrySnapshot, ReputationEntry};
pub use error::{ScanGuardError, ScanGuardResult};
pub use event::{BlockEvent, BlockEventSink, MemorySink, TracingSink};
pub use guard::{ScanGuard, Verdict};
pub use observer::{is_scan_status, ResponseObserver};
pub use rejection::{FixedRejection, GameRejection, Rejection, RejectionStrategy};
pub use store::ReputationStore;
pub use sweeper::spawn_sweeper;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::classifier::{Classifier, Decision};
    pub use crate::config::ScanGuardConfig;
    pub use crate::error::{ScanGuardError, ScanGuardResult};
    pub use crate::guard::{ScanGuard, Verdict};
    pub use crate::observer::ResponseObserver;
    pub use crate::rejection::Rejection;
}
