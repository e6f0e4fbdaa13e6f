//! Guidewatch
//!
//! Live operator console for the guide desk. Mirrors the server's guide
//! list over Server-Sent Events and drives one guide at a time through a
//! confirm-then-commit status change.

mod api;
mod clock;
mod config;
mod error;
mod logging;
mod monitor;
mod operator_actor;
mod operator_command;
mod operator_console;
mod paths;
mod probe;
mod reconcile;
mod reconnect;
mod redirect;
mod sse;
mod state;
mod stream;
mod workflow;

#[cfg(test)]
mod fixtures;

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::{Config, ConnectionArgs, FileConfig};

#[derive(Parser)]
#[command(name = "guidewatch")]
#[command(about = "Live operator console for the guide desk", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (logs, config.toml)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive operator console
    Operator,
    /// Show the read-only monitor board
    Monitor,
    /// Close the server session
    Logout,
    /// Print the resolved configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "guidewatch", &mut io::stdout());
        return Ok(());
    }

    let data_dir = paths::resolve_data_dir(cli.data_dir.as_deref())?;
    paths::ensure_dirs(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let logging = logging::init_logging(&paths::log_dir(&data_dir))?;

    let file = FileConfig::load(&paths::config_path(&data_dir))?;
    let config = Config::resolve(&cli.connection, file)?;

    info!(
        component = "main",
        event = "main.command.start",
        run_id = %logging.run_id,
        data_dir = %data_dir.display(),
        log_path = %logging.log_path.display(),
        "Guidewatch starting"
    );

    match cli.command {
        Commands::Operator => operator_console::run_operator(&config).await,
        Commands::Monitor => monitor::run_monitor(&config).await,
        Commands::Logout => logout(&config).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

async fn logout(config: &Config) -> anyhow::Result<()> {
    let api = ApiClient::new(config)?;
    let response = api.logout().await;
    if response.is_success() {
        println!("Logged out");
        return Ok(());
    }
    warn!(
        component = "main",
        event = "main.logout.failed",
        status = response.status,
        "Logout failed"
    );
    anyhow::bail!(
        "logout failed with status {}: {}",
        response.status,
        response.content.message
    )
}
