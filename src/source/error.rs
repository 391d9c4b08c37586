//! Error types for the version source boundary.
//!
//! Every failure a [`VersionSource`](super::VersionSource) can report is one of
//! these variants; the project runner decides retry, skip or restart purely on
//! the variant, never on the message text.

use thiserror::Error;

/// Classified failure reported by a version source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The credential was rejected or the session could not be established.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Human-readable detail.
        message: String,
    },

    /// The project could not be opened or did not reach the expected state in time.
    #[error("navigation to {locator} failed: {message}")]
    Navigation {
        /// The project locator that was being opened.
        locator: String,
        /// Human-readable detail.
        message: String,
    },

    /// The version list could not be located or decoded.
    #[error("version enumeration failed: {message}")]
    Enumeration {
        /// Human-readable detail.
        message: String,
    },

    /// A short-lived remote glitch; retrying the same version on a fresh session is safe.
    #[error("transient failure fetching version {index}: {message}")]
    TransientUi {
        /// Index of the version being fetched.
        index: usize,
        /// Human-readable detail.
        message: String,
    },

    /// The remote asked us to slow down. The whole session backs off.
    #[error("rate limited by remote")]
    RateLimited,

    /// Anything else. The version is skipped for this iteration.
    #[error("unexpected failure fetching version {index}: {message}")]
    Unknown {
        /// Index of the version being fetched.
        index: usize,
        /// Human-readable detail.
        message: String,
    },
}

impl SourceError {
    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    pub fn navigation(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            locator: locator.into(),
            message: message.into(),
        }
    }

    /// Creates an enumeration error.
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }

    /// Creates a transient fetch error.
    pub fn transient(index: usize, message: impl Into<String>) -> Self {
        Self::TransientUi {
            index,
            message: message.into(),
        }
    }

    /// Creates an unknown fetch error.
    pub fn unknown(index: usize, message: impl Into<String>) -> Self {
        Self::Unknown {
            index,
            message: message.into(),
        }
    }

    /// Returns true for failures that invalidate the whole session
    /// (authentication, navigation, enumeration).
    #[must_use]
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::Navigation { .. } | Self::Enumeration { .. }
        )
    }
}
