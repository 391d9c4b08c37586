//! Per-project download loop.
//!
//! A [`ProjectRunner`] drives one project through
//! `Idle → SessionStarting → Enumerating → Downloading → Completed`, restarting
//! the session whenever the remote misbehaves. It only stops on its own once
//! every finalized version has been attempted; the newest enumerated version
//! is never downloaded because it is still subject to change.
//!
//! # Failure handling
//!
//! | Failure | Reaction |
//! |---------|----------|
//! | session / navigation / enumeration | back off, new session |
//! | transient fetch failure | new session immediately, same index |
//! | rate limited | back off, new session, same index |
//! | unknown fetch failure, artifact write failure | log, next index, checkpoint held |
//! | checkpoint write failure | back off, new session |
//!
//! The backoff sleeps are cut short by the runner's [`CancellationToken`]; a
//! cancelled run ends in [`RunnerState::Abandoned`].

mod report;

pub use report::{RunOutcome, RunReport, RunnerState};

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::artifact::ArtifactStore;
use crate::backoff::BackoffPolicy;
use crate::config::Project;
use crate::logging::ProjectLog;
use crate::progress::{ProgressError, ProgressStore};
use crate::source::{Session, SourceError, VersionHandle, VersionSource};

/// Failure that ends a session attempt and triggers backoff.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to save progress: {0}")]
    Progress(#[from] ProgressError),
}

/// How a session ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Every pending version was attempted.
    Completed,
    /// Transient failure: start a new session right away.
    Restart,
    /// Rate limited: back off, then start a new session.
    BackOff,
    /// Cancellation observed between versions.
    Cancelled,
}

/// Exclusive upper bound of the download range for `total` enumerated
/// versions. The newest entry (`total - 1`) is excluded.
#[must_use]
pub fn download_end(total: usize) -> usize {
    total.saturating_sub(1)
}

/// Shared collaborators for running projects one after another.
#[derive(Clone)]
pub struct ProjectRunner<'a> {
    source: &'a dyn VersionSource,
    credential: &'a str,
    artifacts: &'a ArtifactStore,
    backoff: BackoffPolicy,
    cancel: CancellationToken,
}

impl<'a> ProjectRunner<'a> {
    /// Creates a runner with the default backoff and a never-cancelled token.
    pub fn new(
        source: &'a dyn VersionSource,
        credential: &'a str,
        artifacts: &'a ArtifactStore,
    ) -> Self {
        Self {
            source,
            credential,
            artifacts,
            backoff: BackoffPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `backoff` as the template policy; each run starts from a reset copy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Observes `cancel` before every sleep and session restart.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token this runner observes.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Downloads every pending version of `project`.
    ///
    /// Returns once the project is complete or the run was cancelled; all
    /// other failures are retried. Events are emitted under `log`.
    pub async fn run(
        &self,
        project: &Project,
        progress: &mut ProgressStore,
        log: ProjectLog,
    ) -> RunReport {
        let dispatch = log.dispatch().clone();
        let run = ProjectRun {
            runner: self,
            project,
            progress,
            backoff: self.backoff.clone(),
            state: RunnerState::Idle,
            report: RunReport::new(&project.name),
            _log: log,
        };
        async move {
            let span = info_span!("project", name = %project.name);
            run.drive().instrument(span).await
        }
        .with_subscriber(dispatch)
        .await
    }
}

/// State owned by a single [`ProjectRunner::run`] invocation.
struct ProjectRun<'r, 'a> {
    runner: &'r ProjectRunner<'a>,
    project: &'r Project,
    progress: &'r mut ProgressStore,
    backoff: BackoffPolicy,
    state: RunnerState,
    report: RunReport,
    _log: ProjectLog,
}

impl ProjectRun<'_, '_> {
    async fn drive(mut self) -> RunReport {
        info!(
            url = %self.project.url,
            last_completed = self.progress.last_completed(&self.project.name),
            "== Starting project {} ==",
            self.project.name
        );
        self.backoff.reset();

        loop {
            if self.runner.cancel.is_cancelled() {
                return self.abandon();
            }
            self.transition(RunnerState::SessionStarting);

            match self.run_session().await {
                Ok(SessionEnd::Completed) => return self.complete(),
                Ok(SessionEnd::Restart) => {}
                Ok(SessionEnd::BackOff) => {
                    let delay = self.backoff.next();
                    warn!(delay_secs = delay.as_secs(), "Rate limited, waiting before a new session");
                    if !self.sleep(delay).await {
                        return self.abandon();
                    }
                }
                Ok(SessionEnd::Cancelled) => return self.abandon(),
                Err(failure) => {
                    self.report.session_failures += 1;
                    let delay = self.backoff.next();
                    match &failure {
                        AttemptError::Source(source) if source.is_session_failure() => warn!(
                            error = %source,
                            delay_secs = delay.as_secs(),
                            "Session failed, retrying after backoff"
                        ),
                        other => error!(
                            error = %error_chain(other),
                            delay_secs = delay.as_secs(),
                            "Unexpected failure, retrying after backoff"
                        ),
                    }
                    if !self.sleep(delay).await {
                        return self.abandon();
                    }
                }
            }
        }
    }

    async fn run_session(&mut self) -> Result<SessionEnd, AttemptError> {
        self.report.sessions += 1;
        let mut session = self
            .runner
            .source
            .open_session(self.runner.credential)
            .await?;
        let outcome = self.download_in_session(session.as_mut()).await;
        session.close().await;
        outcome
    }

    async fn download_in_session(
        &mut self,
        session: &mut dyn Session,
    ) -> Result<SessionEnd, AttemptError> {
        let mut context = session.open_project(&self.project.url).await?;

        self.transition(RunnerState::Enumerating);
        let versions: Vec<VersionHandle> = context.list_versions().await?;
        let total = versions.len();
        let resume = self.progress.record().resume_index(&self.project.name);
        let end = download_end(total);
        info!(
            total,
            resume_from = resume,
            pending = end.saturating_sub(resume),
            "Found {total} versions"
        );

        self.transition(RunnerState::Downloading);
        // First index that failed with an unknown error in this iteration.
        // The checkpoint never moves past it.
        let mut held_at: Option<usize> = None;
        let mut failed = Vec::new();

        for (index, version) in versions.iter().enumerate().take(end).skip(resume) {
            if self.runner.cancel.is_cancelled() {
                return Ok(SessionEnd::Cancelled);
            }
            info!(index, "Processing version {index}");

            let content = match context.fetch_version_content(version).await {
                Ok(content) => content,
                Err(SourceError::TransientUi { message, .. }) => {
                    self.report.transient_restarts += 1;
                    warn!(index, error = %message, "Transient failure, restarting session");
                    return Ok(SessionEnd::Restart);
                }
                Err(SourceError::RateLimited) => {
                    self.report.rate_limited += 1;
                    return Ok(SessionEnd::BackOff);
                }
                Err(unknown @ SourceError::Unknown { .. }) => {
                    self.record_version_failure(index, &unknown, &mut held_at, &mut failed);
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            match self
                .runner
                .artifacts
                .write(&self.project.name, index, &content)
                .await
            {
                Ok(stored) => {
                    if let Some(held) = held_at {
                        warn!(
                            index,
                            held_at = held,
                            "Version saved, checkpoint held before earlier failed version"
                        );
                    } else {
                        self.progress.advance(&self.project.name, index)?;
                    }
                    self.report.downloaded += 1;
                    info!(
                        index,
                        bytes = stored.bytes,
                        sha256 = %stored.sha256,
                        path = %stored.path.display(),
                        "Version {index} saved"
                    );
                }
                Err(write_error) => {
                    self.record_version_failure(index, &write_error, &mut held_at, &mut failed);
                }
            }
        }

        self.report.failed_indices = failed;
        Ok(SessionEnd::Completed)
    }

    fn record_version_failure(
        &mut self,
        index: usize,
        failure: &(dyn StdError + 'static),
        held_at: &mut Option<usize>,
        failed: &mut Vec<usize>,
    ) {
        held_at.get_or_insert(index);
        failed.push(index);
        self.report.version_failures += 1;
        error!(
            index,
            error = %error_chain(failure),
            "Failed to process version {index}, moving on"
        );
    }

    /// Sleeps for `delay` unless cancelled first. Returns false on cancellation.
    async fn sleep(&self, delay: Duration) -> bool {
        let cancel = &self.runner.cancel;
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }

    fn transition(&mut self, next: RunnerState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn complete(mut self) -> RunReport {
        self.transition(RunnerState::Completed);
        self.report.outcome = RunOutcome::Completed;
        self.report.final_state = self.state;
        if self.report.failed_indices.is_empty() {
            info!(
                downloaded = self.report.downloaded,
                sessions = self.report.sessions,
                "Project complete"
            );
        } else {
            warn!(
                downloaded = self.report.downloaded,
                failed = ?self.report.failed_indices,
                "Project complete with versions left undownloaded, they are retried on the next launch"
            );
        }
        self.report
    }

    fn abandon(mut self) -> RunReport {
        self.transition(RunnerState::Abandoned);
        self.report.outcome = RunOutcome::Cancelled;
        self.report.final_state = self.state;
        warn!(
            downloaded = self.report.downloaded,
            last_completed = self.progress.last_completed(&self.project.name),
            "Run cancelled, progress is saved"
        );
        self.report
    }
}

/// Renders an error and all of its sources as `outer: inner: root`.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
