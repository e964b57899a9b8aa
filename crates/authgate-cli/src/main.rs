//! authgate - inspect and drive client-side session state from the terminal.
//!
//! Stores or clears the session token, checks routes against the guard,
//! resolves the current user and watches the session flag for changes made
//! by other processes.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use authgate_core::{Config, GuardMode, StorageBackend};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for an additional daily-rolling log file
const ENV_LOG_DIR: &str = "AUTHGATE_LOG_DIR";

#[derive(Debug, Parser)]
#[command(name = "authgate", version, about = "Client-side session state and route guarding")]
struct Cli {
    /// Config file (defaults to ~/.config/authgate/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend holding the token
    #[arg(long, global = true)]
    storage: Option<StorageBackend>,

    /// How the guard decides whether the user is signed in
    #[arg(long, global = true)]
    mode: Option<GuardMode>,

    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a session token (prompts when not given)
    Login {
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove the stored session token
    Logout,
    /// Show whether a token is stored
    Status,
    /// Resolve the current user via GET /auth/me
    Whoami,
    /// Run the route guard for one or more routes
    Check {
        #[arg(required = true)]
        routes: Vec<String>,
    },
    /// Print session flag changes until interrupted
    Watch,
    /// Print the effective configuration
    Config {
        /// Write it back to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "authgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_overrides()?;
            config
        }
        None => Config::load()?,
    };

    // Flags beat environment beat file
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    if let Some(mode) = cli.mode {
        config.guard_mode = mode;
    }
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let config_path = cli.config.clone();
    info!(storage = %config.storage, mode = %config.guard_mode, "authgate starting");

    match cli.command {
        Command::Login { token } => commands::login(config, token),
        Command::Logout => commands::logout(config),
        Command::Status => commands::status(config),
        Command::Whoami => commands::whoami(config).await,
        Command::Check { routes } => commands::check(config, &routes).await,
        Command::Watch => commands::watch(config).await,
        Command::Config { save } => commands::show_config(&config, save, config_path.as_deref()),
    }
}
