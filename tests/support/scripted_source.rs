//! In-memory [`VersionSource`] with scripted failures.
//!
//! Projects are registered by locator with a version count. Failures are
//! queued per call site and consumed in order; once a queue is empty the call
//! succeeds. Every fetch attempt is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use history_core::{ProjectContext, Session, SourceError, VersionHandle, VersionSource};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Script {
    projects: HashMap<String, usize>,
    session_failures: VecDeque<SourceError>,
    enumeration_failures: HashMap<String, VecDeque<SourceError>>,
    fetch_failures: HashMap<(String, usize), VecDeque<SourceError>>,
    cancel_on_fetch: Option<(usize, CancellationToken)>,
    credentials: Vec<String>,
    attempts: Vec<(String, usize)>,
    sessions_opened: usize,
    sessions_closed: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a project with `total` versions.
    pub fn project(self, locator: &str, total: usize) -> Self {
        self.lock().projects.insert(locator.to_string(), total);
        self
    }

    /// Fails the next `open_session` call with `error`.
    pub fn fail_session(self, error: SourceError) -> Self {
        self.lock().session_failures.push_back(error);
        self
    }

    /// Fails the next `list_versions` call for `locator` with `error`.
    pub fn fail_enumeration(self, locator: &str, error: SourceError) -> Self {
        self.lock()
            .enumeration_failures
            .entry(locator.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Fails the next fetch of `(locator, index)` with `error`.
    pub fn fail_fetch(self, locator: &str, index: usize, error: SourceError) -> Self {
        self.lock()
            .fetch_failures
            .entry((locator.to_string(), index))
            .or_default()
            .push_back(error);
        self
    }

    /// Fails every fetch of `(locator, index)` `times` times.
    pub fn fail_fetch_times(self, locator: &str, index: usize, error: SourceError, times: usize) -> Self {
        (0..times).fold(self, |source, _| source.fail_fetch(locator, index, error.clone()))
    }

    /// Cancels `token` while fetching `index`. The fetch itself succeeds.
    pub fn cancel_on_fetch(self, index: usize, token: CancellationToken) -> Self {
        self.lock().cancel_on_fetch = Some((index, token));
        self
    }

    /// Indices fetched for `locator`, in order, failures included.
    pub fn attempts_for(&self, locator: &str) -> Vec<usize> {
        self.lock()
            .attempts
            .iter()
            .filter(|(l, _)| l == locator)
            .map(|(_, index)| *index)
            .collect()
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().sessions_closed
    }

    pub fn credentials(&self) -> Vec<String> {
        self.lock().credentials.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }
}

/// Content served for `(locator, index)`.
pub fn content_for(locator: &str, index: usize) -> Vec<u8> {
    format!("{locator}#{index}").into_bytes()
}

#[async_trait]
impl VersionSource for ScriptedSource {
    async fn open_session(&self, credential: &str) -> Result<Box<dyn Session>, SourceError> {
        let mut script = self.lock();
        script.credentials.push(credential.to_string());
        if let Some(error) = script.session_failures.pop_front() {
            return Err(error);
        }
        script.sessions_opened += 1;
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn open_project(&mut self, locator: &str) -> Result<Box<dyn ProjectContext>, SourceError> {
        let script = self.script.lock().expect("script lock");
        if !script.projects.contains_key(locator) {
            return Err(SourceError::navigation(locator, "no such project"));
        }
        Ok(Box::new(ScriptedProject {
            script: Arc::clone(&self.script),
            locator: locator.to_string(),
        }))
    }

    async fn close(&mut self) {
        self.script.lock().expect("script lock").sessions_closed += 1;
    }
}

struct ScriptedProject {
    script: Arc<Mutex<Script>>,
    locator: String,
}

#[async_trait]
impl ProjectContext for ScriptedProject {
    async fn list_versions(&mut self) -> Result<Vec<VersionHandle>, SourceError> {
        let mut script = self.script.lock().expect("script lock");
        if let Some(error) = script
            .enumeration_failures
            .get_mut(&self.locator)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        let total = script.projects.get(&self.locator).copied().unwrap_or(0);
        Ok((0..total)
            .map(|index| VersionHandle::new(index, format!("{}/v/{index}", self.locator)))
            .collect())
    }

    async fn fetch_version_content(&mut self, version: &VersionHandle) -> Result<Vec<u8>, SourceError> {
        let mut script = self.script.lock().expect("script lock");
        let index = version.index();
        script.attempts.push((self.locator.clone(), index));
        if let Some((cancel_at, token)) = &script.cancel_on_fetch {
            if *cancel_at == index {
                token.cancel();
            }
        }
        if let Some(error) = script
            .fetch_failures
            .get_mut(&(self.locator.clone(), index))
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(content_for(&self.locator, index))
    }
}
