//! Durable per-project checkpoint of the last downloaded version.
//!
//! The checkpoint is a small, human-readable JSON object:
//!
//! ```text
//! {
//!   "demo": 4,
//!   "thesis": -1
//! }
//! ```
//!
//! `-1` means no version has been downloaded yet. Every write goes to a
//! sibling temp file that is then renamed over the checkpoint, so a reader
//! never observes a partially written record.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Checkpoint value meaning "nothing downloaded yet".
pub const NO_PROGRESS: i64 = -1;

/// Errors raised while loading or persisting the checkpoint.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// The checkpoint file could not be read or written.
    #[error("IO error on progress file {path}: {source}")]
    Io {
        /// Checkpoint path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The checkpoint exists but is not a valid record.
    #[error("progress file {path} is corrupt: {reason}")]
    Corrupt {
        /// Checkpoint path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An update would move a project's checkpoint backwards.
    #[error("refusing to move progress for '{project}' back from {current} to {requested}")]
    Regression {
        /// Project name.
        project: String,
        /// Currently stored index.
        current: i64,
        /// Index that was requested.
        requested: i64,
    },
}

impl ProgressError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// In-memory view of the checkpoint: project name to last completed index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressRecord {
    entries: BTreeMap<String, i64>,
}

impl ProgressRecord {
    /// Builds a record with every project at [`NO_PROGRESS`].
    pub fn fresh<'a>(projects: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            entries: projects
                .into_iter()
                .map(|name| (name.to_string(), NO_PROGRESS))
                .collect(),
        }
    }

    /// Last completed index for `project`, [`NO_PROGRESS`] when unknown.
    #[must_use]
    pub fn last_completed(&self, project: &str) -> i64 {
        self.entries.get(project).copied().unwrap_or(NO_PROGRESS)
    }

    /// First index that still needs downloading for `project`.
    #[must_use]
    pub fn resume_index(&self, project: &str) -> usize {
        let next = self.last_completed(project).saturating_add(1);
        if next <= 0 {
            0
        } else {
            usize::try_from(next).unwrap_or(usize::MAX)
        }
    }

    /// Iterates over `(project, last completed index)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(name, index)| (name.as_str(), *index))
    }

    fn to_json(&self) -> String {
        // A map of strings to integers always serializes.
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Owner of the checkpoint file and its in-memory record.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    record: ProgressRecord,
}

impl ProgressStore {
    /// Loads the checkpoint at `path`.
    ///
    /// When the file does not exist, a fresh record with every project in
    /// `known_projects` at [`NO_PROGRESS`] is written before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Corrupt`] when the file exists but cannot be
    /// parsed, and [`ProgressError::Io`] when it cannot be read or written.
    pub fn load<'a>(
        path: impl Into<PathBuf>,
        known_projects: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ProgressError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                let store = Self {
                    record: ProgressRecord::fresh(known_projects),
                    path,
                };
                store.persist(&store.record)?;
                info!(path = %store.path.display(), "Created new progress file");
                return Ok(store);
            }
            Err(error) => return Err(ProgressError::io(&path, error)),
        };

        let record = parse_record(&path, &raw)?;
        debug!(path = %path.display(), projects = record.entries.len(), "Loaded progress file");
        Ok(Self { path, record })
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current in-memory record.
    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    /// Last completed index for `project`.
    #[must_use]
    pub fn last_completed(&self, project: &str) -> i64 {
        self.record.last_completed(project)
    }

    /// Records `index` as the last completed version of `project` and
    /// persists the whole record before returning.
    ///
    /// The in-memory record only changes once the file write succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Regression`] if `index` is lower than the stored
    /// value, or [`ProgressError::Io`] if the write fails.
    pub fn advance(&mut self, project: &str, index: usize) -> Result<(), ProgressError> {
        let requested = i64::try_from(index).unwrap_or(i64::MAX);
        let current = self.record.last_completed(project);
        if requested < current {
            return Err(ProgressError::Regression {
                project: project.to_string(),
                current,
                requested,
            });
        }

        let mut next = self.record.clone();
        next.entries.insert(project.to_string(), requested);
        self.persist(&next)?;
        self.record = next;
        debug!(project, index, "progress saved");
        Ok(())
    }

    fn persist(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        atomic_write(&self.path, record.to_json().as_bytes())
            .map_err(|error| ProgressError::io(&self.path, error))
    }
}

fn parse_record(path: &Path, raw: &str) -> Result<ProgressRecord, ProgressError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ProgressError::corrupt(path, format!("invalid JSON: {e}")))?;
    let serde_json::Value::Object(map) = value else {
        return Err(ProgressError::corrupt(path, "expected a JSON object"));
    };

    let mut entries = BTreeMap::new();
    for (name, value) in map {
        let Some(index) = value.as_i64() else {
            return Err(ProgressError::corrupt(
                path,
                format!("value for '{name}' is not an integer"),
            ));
        };
        if index < NO_PROGRESS {
            return Err(ProgressError::corrupt(
                path,
                format!("value for '{name}' is below {NO_PROGRESS}"),
            ));
        }
        if !is_version_index(index) {
            return Err(ProgressError::corrupt(
                path,
                format!("value {index} for '{name}' is not a usable version index"),
            ));
        }
        entries.insert(name, index);
    }
    Ok(ProgressRecord { entries })
}

/// True when `index + 1` still fits a `usize`, so the next index to fetch exists.
fn is_version_index(index: i64) -> bool {
    index
        .checked_add(1)
        .is_some_and(|next| usize::try_from(next).is_ok_and(|next| next < usize::MAX))
}

/// Writes `bytes` to a temp file next to `path`, flushes it to disk, then
/// renames it into place and syncs the parent directory.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().and_then(|s| s.to_str()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid file path for atomic write: {}", path.display()),
        )
    })?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(error) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(error);
    }
    sync_parent_dir(path)
}

/// Makes a rename inside `path`'s directory durable.
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

/// Directory handles cannot be synced on this platform.
#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
