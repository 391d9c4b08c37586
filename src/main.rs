//! CLI entry point for the history downloader.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use history_core::{
    AppConfig, ArtifactStore, ConfigError, ConsoleLogging, HttpVersionSource, LogTarget,
    Orchestrator, ProgressError, ProgressStore, ProjectRunner, init_tracing, open_run_log,
    run_log_path,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod cli;

use cli::Args;

/// Process exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Failure,
    Startup,
    Interrupted,
}

impl ProcessExit {
    /// Configuration and checkpoint problems get their own status.
    fn for_startup_error(error: &anyhow::Error) -> Self {
        let is_startup = error
            .chain()
            .any(|cause| cause.is::<ConfigError>() || cause.is::<ProgressError>());
        if is_startup { Self::Startup } else { Self::Failure }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::FAILURE,
            ProcessExit::Startup => ExitCode::from(2),
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("cannot load configuration from {}", args.config.display()))?;
    config.ensure_directories()?;
    Ok(config)
}

fn load_progress(config: &AppConfig) -> Result<ProgressStore> {
    let progress = ProgressStore::load(
        config.progress_file.clone(),
        config.projects.iter().map(|project| project.name.as_str()),
    )
    .context("cannot load progress file")?;
    for (project, last_completed) in progress.record().iter() {
        info!(project, last_completed, "Checkpoint loaded");
    }
    Ok(progress)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let console = ConsoleLogging {
        default_level: args.default_level().to_string(),
        force_level: args.quiet,
        ansi: !args.no_color && io::stderr().is_terminal(),
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(error) => {
            init_tracing(&console, None);
            error!("{error:#}");
            return ProcessExit::for_startup_error(&error).into();
        }
    };

    // The run log needs the log directory, so it joins once the config is in.
    let (run_log, run_log_error) = match open_run_log(&config.log_dir) {
        Ok(file) => (Some(file), None),
        Err(error) => (None, Some(error)),
    };
    init_tracing(&console, run_log);
    debug!(?args, "CLI arguments parsed");
    if let Some(error) = run_log_error {
        warn!(
            path = %run_log_path(&config.log_dir).display(),
            error = %error,
            "Cannot open run log, logging to console only"
        );
    }

    let mut progress = match load_progress(&config) {
        Ok(progress) => progress,
        Err(error) => {
            error!("{error:#}");
            return ProcessExit::for_startup_error(&error).into();
        }
    };
    info!(
        projects = config.projects.len(),
        output_dir = %config.output_dir.display(),
        progress_file = %progress.path().display(),
        "History downloader starting"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping after the current step");
                signal_cancel.cancel();
            }
            Err(error) => warn!(error = %error, "Cannot listen for Ctrl-C"),
        }
    });

    let source = HttpVersionSource::new(config.source.clone());
    let artifacts = ArtifactStore::new(config.output_dir.clone());
    let runner = ProjectRunner::new(&source, &config.credential, &artifacts)
        .with_backoff(config.backoff_policy())
        .with_cancellation(cancel);
    let orchestrator = Orchestrator::new(
        runner,
        LogTarget::Files {
            log_dir: config.log_dir.clone(),
            console,
        },
    );

    let report = orchestrator.run_all(&config.projects, &mut progress).await;

    if report.was_interrupted() {
        warn!(
            downloaded = report.downloaded(),
            skipped = ?report.skipped,
            "Interrupted, progress is saved"
        );
        return ProcessExit::Interrupted.into();
    }

    info!(downloaded = report.downloaded(), "All projects completed");
    println!("All projects completed");
    ProcessExit::Success.into()
}
