//! Library entry point for the `atomic` binary (spec §6 "CLI surface").
//!
//! Owns argument parsing, the config-root resolution rule, the `init`
//! scaffolding flow, and the interactive chat loop; the unified event
//! pipeline and workflow engine live in `orc-core`/`orc-adapters`.

mod bridge;
mod builtins;
mod cli;
mod repl;

use clap::{CommandFactory, Parser};
use cli::{Cli, Command};
use orc_adapters::{detect_backend_default, CliBackend};
use orc_core::config::OrchestratorConfig;
use std::ffi::OsString;
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs the CLI to completion, returning the process exit code (spec §6:
/// 0 success, 1 user error/command-not-found, 2 fatal).
pub async fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            // clap's --help/-h is handled manually below (disabled auto
            // flag), but malformed arguments still need clap's own message.
            eprint!("{err}");
            return i32::from(err.exit_code() != 0);
        }
    };

    if cli.version {
        println!("atomic {VERSION}");
        return 0;
    }
    if cli.help {
        let _ = Cli::command().print_help();
        println!();
        return 0;
    }
    if !cli.no_banner {
        print_banner();
    }

    match cli.command {
        Some(Command::Init { agent }) => run_init(agent.or(cli.agent), cli.force),
        Some(Command::Chat { workflow: _, agent }) => run_chat(agent.or(cli.agent)).await,
        None => run_chat(cli.agent).await,
    }
}

fn print_banner() {
    println!("atomic v{VERSION} — terminal coding-agent orchestrator\n");
}

/// Resolves the configuration root: an explicit `ATOMIC_HOME` override,
/// else `~/.atomic/` (spec §6 "Environment").
fn config_root() -> PathBuf {
    if let Ok(root) = std::env::var("ATOMIC_HOME") {
        return PathBuf::from(root);
    }
    dirs_home().join(".atomic")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

fn agent_config_dir(root: &std::path::Path, name: &str) -> PathBuf {
    root.join("agents").join(name)
}

fn resolve_backend_name(requested: Option<String>) -> Result<String, orc_adapters::NoBackendError> {
    match requested {
        Some(name) => Ok(name),
        None => detect_backend_default(),
    }
}

fn run_init(agent: Option<String>, force: bool) -> i32 {
    run_init_at(&config_root(), agent, force)
}

fn run_init_at(root: &std::path::Path, agent: Option<String>, force: bool) -> i32 {
    let name = match resolve_backend_name(agent) {
        Ok(name) => name,
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };

    let dir = agent_config_dir(root, &name);
    if dir.exists() && !force {
        println!("Agent config for '{name}' already exists at {}. Use --force to reinitialize.", dir.display());
        return 0;
    }
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("failed to scaffold agent config directory: {err}");
        return 2;
    }
    println!("Initialized agent config for '{name}' at {}", dir.display());
    0
}

fn load_config(root: &std::path::Path) -> OrchestratorConfig {
    let config_path = root.join("config.yml");
    OrchestratorConfig::from_file(&config_path).unwrap_or_default()
}

async fn run_chat(agent: Option<String>) -> i32 {
    let root = config_root();
    let name = match resolve_backend_name(agent.clone()) {
        Ok(name) => name,
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };

    if agent.is_some() && !agent_config_dir(&root, &name).exists() {
        let exit_code = run_init(Some(name.clone()), false);
        if exit_code != 0 {
            return exit_code;
        }
    }

    let mut config = load_config(&root);
    let _warnings = config.validate();
    let settings = config.adapter_settings(&name);
    let backend = CliBackend::from_settings(&name, &settings);

    let mut repl = repl::Repl::new(name, backend, config.sessions_root.clone(), config.ralph.max_iterations);
    repl.run_interactive().await
}
