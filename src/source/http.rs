//! `reqwest`-backed version source.
//!
//! Sessions carry the credential as a cookie in a fresh [`Jar`] so every
//! session restart starts from a clean client. The remote is expected to
//! expose, for each project URL, a JSON listing at
//! `<project url>/<versions_path>`:
//!
//! ```text
//! [
//!   { "id": 1, "download_url": "https://remote.example/project/abc/version/1/zip" },
//!   { "id": 2, "download_url": "/project/abc/version/2/zip" }
//! ]
//! ```
//!
//! Entries are oldest first. Relative `download_url`s resolve against the
//! project URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{ProjectContext, Session, SourceError, VersionHandle, VersionSource};

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP read timeout (5 minutes, snapshots can be large archives).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection settings for [`HttpVersionSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceSettings {
    /// URL requested to validate a new session; the credential cookie is scoped to it.
    pub session_url: Url,
    /// Name of the cookie that carries the credential.
    pub cookie_name: String,
    /// Path appended to a project URL to list its versions.
    pub versions_path: String,
    /// Connect timeout for every request.
    pub connect_timeout: Duration,
    /// Total timeout for every request.
    pub read_timeout: Duration,
}

impl HttpSourceSettings {
    /// Creates settings with default timeouts and listing path.
    pub fn new(session_url: Url, cookie_name: impl Into<String>) -> Self {
        Self {
            session_url,
            cookie_name: cookie_name.into(),
            versions_path: "versions".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Version source speaking plain HTTP with cookie authentication.
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    settings: Arc<HttpSourceSettings>,
}

impl HttpVersionSource {
    /// Creates a source from its settings.
    #[must_use]
    pub fn new(settings: HttpSourceSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    fn build_client(&self, credential: &str) -> Result<Client, SourceError> {
        let jar = Arc::new(Jar::default());
        let cookie = format!("{}={}; Path=/", self.settings.cookie_name, credential);
        jar.add_cookie_str(&cookie, &self.settings.session_url);

        Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.read_timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .cookie_provider(jar)
            .build()
            .map_err(|e| SourceError::authentication(format!("cannot build HTTP client: {e}")))
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    #[instrument(skip(self, credential), fields(session_url = %self.settings.session_url))]
    async fn open_session(&self, credential: &str) -> Result<Box<dyn Session>, SourceError> {
        let client = self.build_client(credential)?;

        let response = client
            .get(self.settings.session_url.clone())
            .send()
            .await
            .map_err(|e| SourceError::authentication(describe_request_error(&e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::authentication(format!(
                "credential rejected (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(SourceError::authentication(format!(
                "session check returned HTTP {}",
                status.as_u16()
            )));
        }

        debug!("session established");
        Ok(Box::new(HttpSession {
            client,
            settings: Arc::clone(&self.settings),
        }))
    }
}

struct HttpSession {
    client: Client,
    settings: Arc<HttpSourceSettings>,
}

#[async_trait]
impl Session for HttpSession {
    #[instrument(skip(self))]
    async fn open_project(&mut self, locator: &str) -> Result<Box<dyn ProjectContext>, SourceError> {
        let project_url =
            Url::parse(locator).map_err(|e| SourceError::navigation(locator, e.to_string()))?;
        let versions_url = versions_url(&project_url, &self.settings.versions_path)
            .map_err(|e| SourceError::navigation(locator, e.to_string()))?;

        let response = self
            .client
            .get(project_url.clone())
            .send()
            .await
            .map_err(|e| SourceError::navigation(locator, describe_request_error(&e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::navigation(
                locator,
                format!("project page returned HTTP {}", status.as_u16()),
            ));
        }

        Ok(Box::new(HttpProjectContext {
            client: self.client.clone(),
            project_url,
            versions_url,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    download_url: String,
}

struct HttpProjectContext {
    client: Client,
    project_url: Url,
    versions_url: Url,
}

#[async_trait]
impl ProjectContext for HttpProjectContext {
    #[instrument(skip(self), fields(url = %self.versions_url))]
    async fn list_versions(&mut self) -> Result<Vec<VersionHandle>, SourceError> {
        let response = self
            .client
            .get(self.versions_url.clone())
            .send()
            .await
            .map_err(|e| SourceError::enumeration(describe_request_error(&e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::enumeration(format!(
                "version listing returned HTTP {}",
                status.as_u16()
            )));
        }

        let entries: Vec<VersionEntry> = response
            .json()
            .await
            .map_err(|e| SourceError::enumeration(format!("invalid version listing: {e}")))?;

        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                self.project_url
                    .join(&entry.download_url)
                    .map(|url| VersionHandle::new(index, url.as_str()))
                    .map_err(|e| {
                        SourceError::enumeration(format!(
                            "invalid download_url for version {index}: {e}"
                        ))
                    })
            })
            .collect()
    }

    #[instrument(skip(self), fields(index = version.index()))]
    async fn fetch_version_content(
        &mut self,
        version: &VersionHandle,
    ) -> Result<Vec<u8>, SourceError> {
        let index = version.index();
        let response = self
            .client
            .get(version.reference())
            .send()
            .await
            .map_err(|e| classify_request_error(index, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_fetch_status(index, status.as_u16()));
        }

        // A body cut short is not retried on a new session.
        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::unknown(index, describe_request_error(&e)))?;
        if body.is_empty() {
            return Err(SourceError::unknown(index, "empty content"));
        }

        debug!(bytes = body.len(), "version content fetched");
        Ok(body.to_vec())
    }
}

fn versions_url(project_url: &Url, versions_path: &str) -> Result<Url, url::ParseError> {
    let base = project_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{}", versions_path.trim_start_matches('/')))
}

fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("history-downloader/{version}")
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    }
}

/// Timeouts and connection failures are worth a fresh session; anything else
/// at the transport level is not understood and skipped.
fn classify_request_error(index: usize, error: &reqwest::Error) -> SourceError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        SourceError::transient(index, describe_request_error(error))
    } else {
        SourceError::unknown(index, describe_request_error(error))
    }
}

/// Classifies a non-success HTTP status returned for version content.
///
/// | Status | Failure |
/// |--------|---------|
/// | 429 | RateLimited |
/// | 408 | TransientUi |
/// | 5xx | TransientUi |
/// | anything else | Unknown |
#[allow(clippy::match_same_arms)]
fn classify_fetch_status(index: usize, status: u16) -> SourceError {
    match status {
        429 => SourceError::RateLimited,
        408 => SourceError::transient(index, "HTTP 408"),
        status if (500..600).contains(&status) => {
            SourceError::transient(index, format!("HTTP {status}"))
        }
        status => SourceError::unknown(index, format!("HTTP {status}")),
    }
}
