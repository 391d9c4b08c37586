//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod scripted_source;

use std::path::{Path, PathBuf};

use history_core::{ArtifactStore, Project, ProgressStore};
use tempfile::TempDir;

/// Temp workspace with an artifact directory and a checkpoint path.
pub struct Workspace {
    pub dir: TempDir,
    pub artifacts: ArtifactStore,
    pub progress_path: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let output = dir.path().join("downloads");
        std::fs::create_dir_all(&output).expect("create output dir");
        let progress_path = dir.path().join("progress.json");
        Self {
            artifacts: ArtifactStore::new(output),
            progress_path,
            dir,
        }
    }

    /// Writes a raw checkpoint before the store is loaded.
    pub fn seed_progress(&self, raw: &str) {
        std::fs::write(&self.progress_path, raw).expect("seed progress");
    }

    pub fn load_progress(&self, projects: &[Project]) -> ProgressStore {
        ProgressStore::load(
            self.progress_path.clone(),
            projects.iter().map(|p| p.name.as_str()),
        )
        .expect("load progress")
    }

    /// Parsed checkpoint file as stored on disk.
    pub fn progress_on_disk(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(&self.progress_path).expect("read progress");
        serde_json::from_str(&raw).expect("progress is JSON")
    }

    pub fn output_dir(&self) -> &Path {
        self.artifacts.output_dir()
    }

    /// Artifact file names in the output directory, sorted.
    pub fn artifact_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.output_dir())
            .expect("read output dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn project(name: &str) -> Project {
    Project {
        name: name.to_string(),
        url: project_url(name),
    }
}

pub fn project_url(name: &str) -> String {
    format!("https://remote.example/project/{name}")
}
