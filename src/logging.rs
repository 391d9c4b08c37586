//! Console, run and per-project logging.
//!
//! The process-wide subscriber writes to stderr and, once the log directory
//! exists, appends to `<log_dir>/log.txt`. Each project run gets its
//! own [`ProjectLog`]: a [`Dispatch`] that feeds the same console output plus
//! an append-only, ANSI-free log file `<log_dir>/<project>.log`. The runner
//! executes under that dispatch, so nothing is shared between projects.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::artifact::sanitize_project_name;

/// Console verbosity settings shared by the global and per-project subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLogging {
    /// Level used when `RUST_LOG` is unset (or ignored).
    pub default_level: String,
    /// Ignore `RUST_LOG` and always use `default_level`.
    pub force_level: bool,
    /// Emit ANSI colors.
    pub ansi: bool,
}

impl Default for ConsoleLogging {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            force_level: false,
            ansi: true,
        }
    }
}

impl ConsoleLogging {
    fn env_filter(&self) -> EnvFilter {
        if self.force_level {
            EnvFilter::new(&self.default_level)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// File name of the process-wide run log inside the log directory.
pub const RUN_LOG_FILE: &str = "log.txt";

/// `<log_dir>/log.txt`.
#[must_use]
pub fn run_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(RUN_LOG_FILE)
}

/// Opens (or creates) the run log in append mode.
///
/// # Errors
///
/// Returns the IO error if the file cannot be opened.
pub fn open_run_log(log_dir: &Path) -> io::Result<File> {
    open_append(&run_log_path(log_dir))
}

/// Installs the process-wide subscriber: stderr, plus `run_log` at info
/// level when given. Safe to call more than once.
pub fn init_tracing(console: &ConsoleLogging, run_log: Option<File>) {
    let _ = tracing_subscriber::registry()
        .with(console_layer(console))
        .with(run_log.map(file_layer))
        .try_init();
}

/// Log sink owned by one project run.
#[derive(Debug, Clone)]
pub struct ProjectLog {
    project: String,
    path: Option<PathBuf>,
    dispatch: Dispatch,
}

impl ProjectLog {
    /// Opens (or creates) `<log_dir>/<project>.log` in append mode and pairs it
    /// with console output configured by `console`.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the log file cannot be opened.
    pub fn open(log_dir: &Path, project: &str, console: &ConsoleLogging) -> io::Result<Self> {
        let path = log_file_path(log_dir, project);
        let file = open_append(&path)?;
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(console))
            .with(file_layer(file));

        Ok(Self {
            project: project.to_string(),
            path: Some(path),
            dispatch: Dispatch::new(subscriber),
        })
    }

    /// Opens a file-only project log, without console output.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the log file cannot be opened.
    pub fn file_only(log_dir: &Path, project: &str) -> io::Result<Self> {
        let path = log_file_path(log_dir, project);
        let file = open_append(&path)?;
        let subscriber = tracing_subscriber::registry().with(file_layer(file));
        Ok(Self {
            project: project.to_string(),
            path: Some(path),
            dispatch: Dispatch::new(subscriber),
        })
    }

    /// Console output only, used when the project's log file cannot be opened.
    #[must_use]
    pub fn console_only(project: &str, console: &ConsoleLogging) -> Self {
        Self {
            project: project.to_string(),
            path: None,
            dispatch: Dispatch::new(tracing_subscriber::registry().with(console_layer(console))),
        }
    }

    /// A log that discards everything.
    #[must_use]
    pub fn disabled(project: &str) -> Self {
        Self {
            project: project.to_string(),
            path: None,
            dispatch: Dispatch::none(),
        }
    }

    /// Project this log belongs to.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Log file path, if this log writes to a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Dispatcher the project run executes under.
    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

/// `<log_dir>/<sanitized project>.log`.
#[must_use]
pub fn log_file_path(log_dir: &Path, project: &str) -> PathBuf {
    log_dir.join(format!("{}.log", sanitize_project_name(project)))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn console_layer<S>(console: &ConsoleLogging) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer::<S>()
        .with_writer(io::stderr)
        .with_ansi(console.ansi)
        .with_filter(console.env_filter())
}

fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer::<S>()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::INFO)
}
