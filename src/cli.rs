//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use history_core::config::DEFAULT_CONFIG_FILE;

/// Resumable download of every historical version of remote projects.
///
/// Reads the project list and credential from a JSON config file, downloads
/// each finalized version as `<project>_v<index>.zip` and checkpoints after
/// every saved version. Interrupt with Ctrl-C; the next launch resumes.
#[derive(Parser, Debug)]
#[command(name = "history-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored console output
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// Console level derived from the flags. `--quiet` wins over `-v`.
    pub fn default_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
