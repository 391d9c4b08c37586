//! Run configuration: projects, credential, directories and tuning.
//!
//! Loaded from a JSON document; the credential may be supplied (and is then
//! overridden) by the `HISTORY_DOWNLOADER_COOKIE` environment variable.
//!
//! ```text
//! {
//!   "cookie": "s%3Aabc...",
//!   "projects": [
//!     { "name": "thesis", "url": "https://remote.example/project/64f0c2" }
//!   ],
//!   "output_dir": "downloads",
//!   "backoff": { "base_secs": 60, "ceiling_secs": 86400 },
//!   "source": { "cookie_name": "session" }
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::artifact::sanitize_project_name;
use crate::backoff::{BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CEILING};
use crate::source::HttpSourceSettings;

/// Environment variable that overrides the configured credential.
pub const COOKIE_ENV_VAR: &str = "HISTORY_DOWNLOADER_COOKIE";

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

const DEFAULT_OUTPUT_DIR: &str = "downloads";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_PROGRESS_FILE: &str = "progress.json";
const DEFAULT_COOKIE_NAME: &str = "session";
const DEFAULT_VERSIONS_PATH: &str = "versions";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Errors that abort startup before any project runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// No credential in the file or the environment.
    #[error("no credential configured: set `cookie` in the config file or {COOKIE_ENV_VAR}")]
    MissingCredential,

    /// The project list is absent or empty.
    #[error("project list is empty or missing")]
    NoProjects,

    /// A value failed validation.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// One project whose history is downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    /// Unique name; keys the checkpoint, the artifact names and the log file.
    pub name: String,
    /// Remote locator of the project.
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    cookie: Option<String>,
    #[serde(default)]
    projects: Vec<Project>,
    output_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    progress_file: Option<PathBuf>,
    #[serde(default)]
    backoff: BackoffSection,
    #[serde(default)]
    source: SourceSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackoffSection {
    base_secs: Option<u64>,
    ceiling_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceSection {
    session_url: Option<String>,
    cookie_name: Option<String>,
    versions_path: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
}

/// Fully resolved and validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Session credential (environment value wins over the file).
    pub credential: String,
    /// Projects in processing order.
    pub projects: Vec<Project>,
    /// Artifact directory.
    pub output_dir: PathBuf,
    /// Per-project log directory.
    pub log_dir: PathBuf,
    /// Checkpoint file.
    pub progress_file: PathBuf,
    /// Backoff base delay.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_ceiling: Duration,
    /// HTTP source settings.
    pub source: HttpSourceSettings,
}

impl AppConfig {
    /// Loads and validates the configuration at `path`, reading the
    /// credential override from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let env_cookie = std::env::var(COOKIE_ENV_VAR).ok();
        Self::load_with_env_cookie(path, env_cookie.as_deref())
    }

    /// Like [`load`](Self::load) with an explicit credential override.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn load_with_env_cookie(path: &Path, env_cookie: Option<&str>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, env_cookie).map_err(|error| match error {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn from_json_str(raw: &str, env_cookie: Option<&str>) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        file.resolve(env_cookie)
    }

    /// Backoff policy built from the configured base and ceiling.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.backoff_base, self.backoff_ceiling)
    }

    /// Creates the output directory, the log directory and the checkpoint's parent.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error with the failing directory in context.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        let progress_parent = self
            .progress_file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty());
        let dirs = [Some(self.output_dir.as_path()), Some(self.log_dir.as_path()), progress_parent];
        for dir in dirs.into_iter().flatten() {
            fs::create_dir_all(dir).map_err(|error| {
                ConfigError::invalid("directories", format!("cannot create {}: {error}", dir.display()))
            })?;
        }
        Ok(())
    }
}

impl FileConfig {
    fn resolve(self, env_cookie: Option<&str>) -> Result<AppConfig, ConfigError> {
        let credential = env_cookie
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .or(self.cookie.filter(|value| !value.trim().is_empty()))
            .ok_or(ConfigError::MissingCredential)?;

        if self.projects.is_empty() {
            return Err(ConfigError::NoProjects);
        }
        let mut parsed_urls = Vec::with_capacity(self.projects.len());
        validate_projects(&self.projects, &mut parsed_urls)?;

        let base_secs = self.backoff.base_secs.unwrap_or(DEFAULT_BACKOFF_BASE.as_secs());
        let ceiling_secs = self
            .backoff
            .ceiling_secs
            .unwrap_or(DEFAULT_BACKOFF_CEILING.as_secs());
        if base_secs == 0 {
            return Err(ConfigError::invalid("backoff.base_secs", "must be at least 1"));
        }
        if ceiling_secs < base_secs {
            return Err(ConfigError::invalid(
                "backoff.ceiling_secs",
                format!("{ceiling_secs} is below base_secs {base_secs}"),
            ));
        }

        let session_url = match self.source.session_url {
            Some(raw) => parse_http_url("source.session_url", &raw)?,
            // The first project is always present after validation.
            None => origin_of(&parsed_urls[0]),
        };
        let cookie_name = self
            .source
            .cookie_name
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
        if cookie_name.is_empty() || cookie_name.contains(['=', ';', ' ']) {
            return Err(ConfigError::invalid(
                "source.cookie_name",
                format!("'{cookie_name}' is not a valid cookie name"),
            ));
        }
        let connect_timeout_secs = validate_timeout_secs(
            "source.connect_timeout_secs",
            self.source.connect_timeout_secs,
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let read_timeout_secs = validate_timeout_secs(
            "source.read_timeout_secs",
            self.source.read_timeout_secs,
            DEFAULT_READ_TIMEOUT_SECS,
        )?;

        Ok(AppConfig {
            credential,
            projects: self.projects,
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            progress_file: self
                .progress_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRESS_FILE)),
            backoff_base: Duration::from_secs(base_secs),
            backoff_ceiling: Duration::from_secs(ceiling_secs),
            source: HttpSourceSettings {
                session_url,
                cookie_name,
                versions_path: self
                    .source
                    .versions_path
                    .unwrap_or_else(|| DEFAULT_VERSIONS_PATH.to_string()),
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                read_timeout: Duration::from_secs(read_timeout_secs),
            },
        })
    }
}

fn validate_projects(projects: &[Project], parsed_urls: &mut Vec<Url>) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut stems = HashSet::new();
    for (position, project) in projects.iter().enumerate() {
        let field = format!("projects[{position}]");
        if project.name.trim().is_empty() {
            return Err(ConfigError::invalid(field, "name is empty"));
        }
        if !names.insert(project.name.as_str()) {
            return Err(ConfigError::invalid(
                field,
                format!("duplicate project name '{}'", project.name),
            ));
        }
        if !stems.insert(sanitize_project_name(&project.name)) {
            return Err(ConfigError::invalid(
                field,
                format!(
                    "project name '{}' maps to the same file names as another project",
                    project.name
                ),
            ));
        }
        parsed_urls.push(parse_http_url(&format!("{field}.url"), &project.url)?);
    }
    Ok(())
}

fn parse_http_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(field, format!("'{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            field,
            format!("'{raw}' is not an http(s) URL"),
        ));
    }
    Ok(url)
}

fn origin_of(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

fn validate_timeout_secs(field: &str, value: Option<u64>, default: u64) -> Result<u64, ConfigError> {
    let value = value.unwrap_or(default);
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("{value}. Expected range: 1..=3600"),
        ));
    }
    Ok(value)
}
