//! How rejected requests are answered.
//!
//! The classifier only decides *that* a request is rejected. A
//! [`RejectionStrategy`] decides what the client sees, so the decision stays
//! deterministic while the answer may not be.

use std::fmt::Debug;

use rand::Rng;

use crate::config::ScanGuardConfig;

/// Concrete answer to a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Respond with this HTTP status.
    Status(u16),
    /// Abort the connection without a response.
    Drop,
}

impl Rejection {
    /// Status code, if the rejection is answered with one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Drop => None,
        }
    }

    /// Whether the connection should be aborted.
    #[must_use]
    pub const fn is_drop(&self) -> bool {
        matches!(self, Self::Drop)
    }
}

/// Chooses the answer for a rejected request.
pub trait RejectionStrategy: Send + Sync + Debug {
    /// Produce the answer for one rejected request.
    fn reject(&self) -> Rejection;
}

/// Always answers with the same status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRejection {
    status: u16,
}

impl FixedRejection {
    /// Create a strategy answering with `status`.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self { status }
    }
}

impl Default for FixedRejection {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_REJECT_STATUS)
    }
}

impl RejectionStrategy for FixedRejection {
    fn reject(&self) -> Rejection {
        Rejection::Status(self.status)
    }
}

/// Statuses a scanner may be fed when playing games.
pub const GAME_STATUSES: [u16; 11] = [400, 401, 403, 404, 405, 406, 408, 410, 418, 429, 451];

/// Answers with a random 4xx status, or occasionally drops the connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRejection {
    drop_probability: f64,
}

impl GameRejection {
    /// Default share of rejections answered by dropping the connection.
    pub const DEFAULT_DROP_PROBABILITY: f64 = 0.1;

    /// Create a strategy that drops with the given probability.
    ///
    /// The probability is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(drop_probability: f64) -> Self {
        let drop_probability = if drop_probability.is_nan() {
            0.0
        } else {
            drop_probability.clamp(0.0, 1.0)
        };
        Self { drop_probability }
    }

    /// Probability of dropping the connection.
    #[must_use]
    pub const fn drop_probability(&self) -> f64 {
        self.drop_probability
    }
}

impl Default for GameRejection {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DROP_PROBABILITY)
    }
}

impl RejectionStrategy for GameRejection {
    fn reject(&self) -> Rejection {
        let mut rng = rand::thread_rng();

        if rng.gen_bool(self.drop_probability) {
            return Rejection::Drop;
        }

        let index = rng.gen_range(0..GAME_STATUSES.len());
        Rejection::Status(GAME_STATUSES[index])
    }
}

/// Pick the strategy a configuration asks for.
#[must_use]
pub fn strategy_from_config(config: &ScanGuardConfig) -> Box<dyn RejectionStrategy> {
    if config.play_games {
        Box::new(GameRejection::default())
    } else {
        Box::new(FixedRejection::new(config.reject_status))
    }
}
