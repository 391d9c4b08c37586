//! Sequential driver over all configured projects.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::Project;
use crate::logging::{ConsoleLogging, ProjectLog};
use crate::progress::ProgressStore;
use crate::runner::{ProjectRunner, RunReport};

/// Where per-project logs go.
#[derive(Debug, Clone)]
pub enum LogTarget {
    /// `<log_dir>/<project>.log` plus console output.
    Files {
        /// Log directory (must exist).
        log_dir: PathBuf,
        /// Console settings.
        console: ConsoleLogging,
    },
    /// `<log_dir>/<project>.log` only.
    FilesOnly {
        /// Log directory (must exist).
        log_dir: PathBuf,
    },
    /// Discard project events.
    Disabled,
}

impl LogTarget {
    fn open(&self, project: &str) -> ProjectLog {
        match self {
            Self::Files { log_dir, console } => ProjectLog::open(log_dir, project, console)
                .unwrap_or_else(|error| {
                    warn!(project, error = %error, "Cannot open project log file, logging to console only");
                    ProjectLog::console_only(project, console)
                }),
            Self::FilesOnly { log_dir } => {
                ProjectLog::file_only(log_dir, project).unwrap_or_else(|error| {
                    warn!(project, error = %error, "Cannot open project log file");
                    ProjectLog::disabled(project)
                })
            }
            Self::Disabled => ProjectLog::disabled(project),
        }
    }
}

/// Results of one orchestrated run.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorReport {
    /// One report per project that was started, in order.
    pub reports: Vec<RunReport>,
    /// Projects never started because of cancellation.
    pub skipped: Vec<String>,
}

impl OrchestratorReport {
    /// True when any project was cancelled or never started.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        !self.skipped.is_empty() || self.reports.iter().any(|report| !report.is_completed())
    }

    /// Versions downloaded across all projects.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.reports.iter().map(|report| report.downloaded).sum()
    }
}

/// Runs projects one at a time, in configuration order.
pub struct Orchestrator<'a> {
    runner: ProjectRunner<'a>,
    logs: LogTarget,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator around a configured runner.
    #[must_use]
    pub fn new(runner: ProjectRunner<'a>, logs: LogTarget) -> Self {
        Self { runner, logs }
    }

    /// Runs every project to completion, stopping early only on cancellation.
    pub async fn run_all(&self, projects: &[Project], progress: &mut ProgressStore) -> OrchestratorReport {
        let mut report = OrchestratorReport::default();

        for (position, project) in projects.iter().enumerate() {
            if self.runner.cancellation().is_cancelled() {
                report
                    .skipped
                    .extend(projects[position..].iter().map(|p| p.name.clone()));
                break;
            }

            info!(
                project = %project.name,
                position = position + 1,
                total = projects.len(),
                "Processing project"
            );
            let log = self.logs.open(&project.name);
            let project_report = self.runner.run(project, progress, log).await;
            info!(
                project = %project.name,
                outcome = ?project_report.outcome,
                downloaded = project_report.downloaded,
                sessions = project_report.sessions,
                "Project finished"
            );
            let cancelled = !project_report.is_completed();
            report.reports.push(project_report);
            if cancelled {
                report
                    .skipped
                    .extend(projects[position + 1..].iter().map(|p| p.name.clone()));
                break;
            }
        }

        report
    }
}
