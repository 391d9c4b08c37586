//! Deterministic on-disk storage for downloaded versions.
//!
//! One file per `(project, version index)`, named
//! `<sanitized project name>_v<index>.zip`. Writing the same version twice
//! replaces the file in place; a temp file plus rename keeps a half-written
//! archive from ever carrying the final name.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// File extension used for every artifact.
pub const ARTIFACT_EXTENSION: &str = "zip";

/// Fallback stem when a project name has no usable filename characters.
const FALLBACK_PROJECT_STEM: &str = "project";

/// Failure writing an artifact to disk.
#[derive(Debug, Error)]
#[error("IO error writing artifact {path}: {source}")]
pub struct ArtifactError {
    /// Destination path.
    pub path: PathBuf,
    /// Underlying IO error.
    #[source]
    pub source: io::Error,
}

/// Result of a successful artifact write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Final artifact path.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes: usize,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

/// Writes version content under a single output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `output_dir`. The directory must exist.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory artifacts are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the artifact for `(project, index)`. Pure function of its inputs.
    #[must_use]
    pub fn path_for(&self, project: &str, index: usize) -> PathBuf {
        self.output_dir.join(artifact_file_name(project, index))
    }

    /// Writes `content` as the artifact for `(project, index)`, replacing any
    /// previous file with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the temp file cannot be written, flushed
    /// or renamed.
    pub async fn write(
        &self,
        project: &str,
        index: usize,
        content: &[u8],
    ) -> Result<StoredArtifact, ArtifactError> {
        let path = self.path_for(project, index);
        let tmp = path.with_extension(format!("{ARTIFACT_EXTENSION}.part"));

        let result = async {
            let mut file = File::create(&tmp).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(source) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ArtifactError { path, source });
        }
        // The checkpoint may only move once the new name survives a crash.
        if let Err(source) = sync_dir(&self.output_dir).await {
            return Err(ArtifactError { path, source });
        }

        let sha256 = format!("{:x}", Sha256::digest(content));
        debug!(path = %path.display(), bytes = content.len(), "artifact written");
        Ok(StoredArtifact {
            path,
            bytes: content.len(),
            sha256,
        })
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Filename for the artifact of `(project, index)`.
#[must_use]
pub fn artifact_file_name(project: &str, index: usize) -> String {
    format!(
        "{}_v{index}.{ARTIFACT_EXTENSION}",
        sanitize_project_name(project)
    )
}

/// Maps a project name onto a single safe filename segment.
///
/// Path separators, reserved characters, whitespace and control characters
/// collapse into single dashes; leading/trailing dashes and dots are dropped.
#[must_use]
pub fn sanitize_project_name(name: &str) -> String {
    let mut sanitized = String::new();
    let mut previous_dash = false;

    for ch in name.trim().chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() || c.is_control() => '-',
            c => c,
        };

        if mapped == '-' {
            if !previous_dash {
                sanitized.push('-');
                previous_dash = true;
            }
        } else {
            sanitized.push(mapped);
            previous_dash = false;
        }
    }

    let trimmed = sanitized.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        FALLBACK_PROJECT_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}
