//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls reply and status format).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "spectrod", version, about = "Spectrum acquisition daemon")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/spectrod.toml")]
    pub config: PathBuf,

    /// Emit replies and status frames as JSON lines instead of plain text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Validate the config and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub check: bool,

    /// Activate the session immediately instead of waiting for a command
    #[arg(long, action = ArgAction::SetTrue)]
    pub activate: bool,
}
