//! User registration subcommands.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use console::style;

use campusnet_types::chat::{User, UserId};

use super::CliError;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a new user and print its id.
    Create {
        /// Display name.
        name: String,
    },
}

pub async fn handle_user_command(cmd: UserCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        UserCommand::Create { name } => create_user(state, &name, json).await,
    }
}

async fn create_user(state: &AppState, name: &str, json: bool) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidInput("user name cannot be empty".to_string()).into());
    }

    let user = state
        .chats
        .create_user(&User {
            id: UserId::new(),
            display_name: name.to_string(),
            created_at: Utc::now(),
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!();
        println!(
            "  {} Created user '{}'",
            style("ok").green(),
            style(&user.display_name).cyan()
        );
        println!("  {} {}", style("id").dim(), user.id);
        println!();
    }

    Ok(())
}
