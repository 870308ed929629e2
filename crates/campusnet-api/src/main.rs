//! CampusNet CLI entry point.
//!
//! Binary name: `campus`
//!
//! Parses CLI arguments, loads configuration, initializes logging and the
//! database, then dispatches to the command handlers.

mod cli;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use campusnet_infra::config::load_global_config;
use campusnet_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use campusnet_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    let result = run(cli).await;
    shutdown_tracing();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report_error(&err, json),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "campus", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    ensure_data_dir(&data_dir).await?;
    let config = load_global_config(&data_dir).await;

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(cli.log_directive(), format, config.logging.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let state = AppState::init(&data_dir, &config).await?;

    match cli.command {
        Commands::User { action } => cli::user::handle_user_command(action, &state, cli.json).await,
        Commands::Chat { action } => cli::chat::handle_chat_command(action, &state, cli.json).await,
        Commands::Message { action } => {
            cli::message::handle_message_command(action, &state, cli.json).await
        }
        Commands::Chunk { action } => {
            cli::chunk::handle_chunk_command(action, &state, cli.json).await
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
