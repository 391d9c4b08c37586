//! Exponential backoff for whole-session failures and rate limiting.
//!
//! A [`BackoffPolicy`] is owned by one project run. It is reset when the run
//! starts and advanced every time the remote rate-limits us or a session
//! cannot be established. The caller sleeps for the returned duration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use history_core::BackoffPolicy;
//!
//! let mut backoff = BackoffPolicy::default();
//! assert_eq!(backoff.next(), Duration::from_secs(60));
//! assert_eq!(backoff.next(), Duration::from_secs(120));
//!
//! backoff.reset();
//! assert_eq!(backoff.next(), Duration::from_secs(60));
//! ```

use std::time::Duration;

use tracing::debug;

/// Default base delay (60 seconds).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(60);

/// Default delay ceiling (24 hours).
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(86_400);

/// Growth factor applied after every returned delay.
const BACKOFF_MULTIPLIER: u32 = 2;

/// Stateful exponential delay generator with a hard ceiling.
///
/// # Delay Calculation
///
/// ```text
/// returned = current
/// current  = min(current * 2, ceiling)
/// ```
///
/// With defaults the sequence is 60s, 120s, 240s, ... and settles at 86400s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CEILING)
    }
}

impl BackoffPolicy {
    /// Creates a policy starting at `base`. A base above `ceiling` is clamped.
    #[must_use]
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        let base = base.min(ceiling);
        Self {
            base,
            ceiling,
            current: base,
        }
    }

    /// Returns the configured base delay.
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Returns the delay the next call to [`next`](Self::next) will yield.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Restarts the sequence at the base delay.
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Returns the current delay and advances the sequence.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = delay
            .checked_mul(BACKOFF_MULTIPLIER)
            .map_or(self.ceiling, |grown| grown.min(self.ceiling));
        debug!(
            delay_secs = delay.as_secs(),
            next_secs = self.current.as_secs(),
            "backoff advanced"
        );
        delay
    }
}
