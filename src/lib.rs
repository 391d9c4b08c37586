//! History Downloader Core Library
//!
//! Downloads every finalized historical version of a set of remote projects
//! and stores each one as a numbered archive. Work is checkpointed after
//! every saved version, so an interrupted run resumes where it stopped.
//!
//! # Architecture
//!
//! - [`config`] - Configuration file, credential override and validation
//! - [`progress`] - Durable per-project checkpoint
//! - [`backoff`] - Exponential delay between failed sessions
//! - [`source`] - Remote version source boundary and its HTTP implementation
//! - [`artifact`] - Atomic artifact storage
//! - [`runner`] - Per-project session state machine
//! - [`orchestrator`] - Sequential run over all projects
//! - [`logging`] - Console, run log and per-project log files

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod artifact;
pub mod backoff;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod source;

// Re-export commonly used types
pub use artifact::{ArtifactError, ArtifactStore, StoredArtifact};
pub use backoff::BackoffPolicy;
pub use config::{AppConfig, ConfigError, Project};
pub use logging::{ConsoleLogging, ProjectLog, init_tracing, open_run_log, run_log_path};
pub use orchestrator::{LogTarget, Orchestrator, OrchestratorReport};
pub use progress::{NO_PROGRESS, ProgressError, ProgressRecord, ProgressStore};
pub use runner::{ProjectRunner, RunOutcome, RunReport, RunnerState, download_end};
pub use source::{
    HttpSourceSettings, HttpVersionSource, ProjectContext, Session, SourceError, VersionHandle,
    VersionSource,
};
