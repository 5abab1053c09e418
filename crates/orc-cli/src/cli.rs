//! Argument parsing for the CLI surface (spec §6).

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "atomic",
    about = "Terminal coding-agent orchestrator",
    disable_version_flag = true,
    disable_help_flag = true
)]
pub struct Cli {
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue, global = true)]
    pub version: bool,

    #[arg(short = 'h', long = "help", action = ArgAction::SetTrue, global = true)]
    pub help: bool,

    /// Suppress the startup banner.
    #[arg(long, global = true)]
    pub no_banner: bool,

    /// Skip interactive confirmations (overwrite existing config, etc).
    #[arg(short = 'f', long, global = true)]
    pub force: bool,

    /// Backend to use (`claude`, `kiro`, `gemini`, `codex`, `amp`, or a
    /// custom adapter name). Defaults to auto-detection.
    #[arg(short = 'a', long, global = true)]
    pub agent: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scaffold agent config directories.
    Init {
        #[arg(long)]
        agent: Option<String>,
    },
    /// Start an interactive chat session.
    Chat {
        /// Enables workflow telemetry (surfaces Ralph iteration/task events).
        #[arg(long)]
        workflow: bool,
        #[arg(short = 'a', long)]
        agent: Option<String>,
    },
}
