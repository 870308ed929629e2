//! CLI command definitions and dispatch for the `campus` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by noun
//! (e.g., `campus chat create`, `campus message send`).

pub mod chat;
pub mod chunk;
pub mod message;
pub mod user;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;

use campusnet_types::error::{AppendError, OutcomeStatus, RepositoryError};

/// Group chats for students, stored in weight-bounded message chunks.
#[derive(Parser)]
#[command(name = "campus", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter for the chosen verbosity. `RUST_LOG` overrides it.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,campusnet_core=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register users.
    User {
        #[command(subcommand)]
        action: user::UserCommand,
    },

    /// Create chats and manage membership.
    Chat {
        #[command(subcommand)]
        action: chat::ChatCommand,
    },

    /// Send, delete, and read messages.
    #[command(alias = "msg")]
    Message {
        #[command(subcommand)]
        action: message::MessageCommand,
    },

    /// Inspect a chat's chunk chain.
    Chunk {
        #[command(subcommand)]
        action: chunk::ChunkCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Errors raised by the CLI itself before a service is involved.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),
}

/// Caller-facing classification of any error a command returns.
pub fn classify(err: &anyhow::Error) -> OutcomeStatus {
    if let Some(e) = err.downcast_ref::<AppendError>() {
        return e.status();
    }
    if let Some(e) = err.downcast_ref::<CliError>() {
        return match e {
            CliError::InvalidInput(_) => OutcomeStatus::Validation,
            CliError::NotFound(_) => OutcomeStatus::NotFound,
        };
    }
    if let Some(e) = err.downcast_ref::<RepositoryError>() {
        return match e {
            RepositoryError::NotFound => OutcomeStatus::NotFound,
            RepositoryError::Conflict(_) => OutcomeStatus::Validation,
            _ => OutcomeStatus::Internal,
        };
    }
    OutcomeStatus::Internal
}

/// Process exit code for an outcome.
pub fn exit_code(status: OutcomeStatus) -> u8 {
    match status {
        OutcomeStatus::Success => 0,
        OutcomeStatus::Internal => 1,
        OutcomeStatus::Validation => 2,
        OutcomeStatus::NotFound => 3,
        OutcomeStatus::Forbidden => 4,
    }
}

/// Print a failed command's error and pick the exit code.
pub fn report_error(err: &anyhow::Error, json: bool) -> ExitCode {
    let status = classify(err);
    if json {
        let body = serde_json::json!({
            "status": status,
            "error": format!("{err:#}"),
        });
        println!("{body}");
    } else {
        eprintln!();
        eprintln!(
            "  {} {} {err:#}",
            style("error").red().bold(),
            style(format!("[{status}]")).dim(),
        );
        eprintln!();
    }
    ExitCode::from(exit_code(status))
}

/// First 8 characters of an id, for tables.
pub(crate) fn short_id(id: impl std::fmt::Display) -> String {
    id.to_string().chars().take(8).collect()
}
