//! Remote version source boundary.
//!
//! The runner talks to the remote only through three object-safe async traits:
//!
//! - [`VersionSource`] - authenticates and hands out a [`Session`]
//! - [`Session`] - opens a project and yields a [`ProjectContext`]
//! - [`ProjectContext`] - enumerates versions and fetches their bytes
//!
//! Failures are always reported as a classified [`SourceError`]. The crate
//! ships one implementation, [`HttpVersionSource`], built on `reqwest`.

mod error;
mod http;

pub use error::SourceError;
pub use http::{HttpSourceSettings, HttpVersionSource};

use async_trait::async_trait;

/// Opaque reference to one version of a project, valid for one session.
///
/// `index` is the zero-based position in the oldest-first sequence returned by
/// [`ProjectContext::list_versions`]. `reference` is whatever the source needs
/// to fetch the content later (a URL for the HTTP source).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHandle {
    index: usize,
    reference: String,
}

impl VersionHandle {
    /// Creates a handle for the version at `index`.
    pub fn new(index: usize, reference: impl Into<String>) -> Self {
        Self {
            index,
            reference: reference.into(),
        }
    }

    /// Position of this version, oldest first.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Source-specific locator of the version content.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

/// Entry point of a remote source: turns a credential into a live session.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Establishes a fresh authenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Authentication`] when the credential is invalid
    /// or the remote is unreachable.
    async fn open_session(&self, credential: &str) -> Result<Box<dyn Session>, SourceError>;
}

/// One authenticated handle to the remote.
#[async_trait]
pub trait Session: Send {
    /// Opens the project at `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Navigation`] when the project cannot be reached.
    async fn open_project(&mut self, locator: &str) -> Result<Box<dyn ProjectContext>, SourceError>;

    /// Tears the session down. Called whenever the runner leaves a session.
    async fn close(&mut self) {}
}

/// An opened project inside a session.
#[async_trait]
pub trait ProjectContext: Send {
    /// Lists all versions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Enumeration`] when the list cannot be located.
    async fn list_versions(&mut self) -> Result<Vec<VersionHandle>, SourceError>;

    /// Fetches the raw content of one version.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::TransientUi`], [`SourceError::RateLimited`] or
    /// [`SourceError::Unknown`].
    async fn fetch_version_content(&mut self, version: &VersionHandle)
    -> Result<Vec<u8>, SourceError>;
}
