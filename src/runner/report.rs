//! Runner states and the per-project summary.

/// Lifecycle of one project run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Not started.
    Idle,
    /// Opening a session and the project.
    SessionStarting,
    /// Listing versions.
    Enumerating,
    /// Fetching and storing pending versions.
    Downloading,
    /// All finalized versions were attempted. Terminal.
    Completed,
    /// Stopped by cancellation. Terminal.
    Abandoned,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every finalized version was attempted.
    Completed,
    /// The cancellation token fired.
    Cancelled,
}

/// Counters collected over one [`ProjectRunner::run`](super::ProjectRunner::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Project name.
    pub project: String,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// State the runner finished in.
    pub final_state: RunnerState,
    /// Versions written to disk, re-downloads included.
    pub downloaded: usize,
    /// Indices that failed with an unknown error during the completing iteration.
    pub failed_indices: Vec<usize>,
    /// Per-version unknown failures across all sessions.
    pub version_failures: usize,
    /// Sessions opened, successful or not.
    pub sessions: u32,
    /// Rate-limit responses seen.
    pub rate_limited: u32,
    /// Sessions restarted after a transient failure.
    pub transient_restarts: u32,
    /// Session attempts that failed outright.
    pub session_failures: u32,
}

impl RunReport {
    pub(super) fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            outcome: RunOutcome::Cancelled,
            final_state: RunnerState::Idle,
            downloaded: 0,
            failed_indices: Vec::new(),
            version_failures: 0,
            sessions: 0,
            rate_limited: 0,
            transient_restarts: 0,
            session_failures: 0,
        }
    }

    /// True when the project finished without being cancelled.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}
