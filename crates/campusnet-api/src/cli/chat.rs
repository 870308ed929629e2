//! Chat subcommands: create a chat, add members, list members.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use campusnet_types::chat::{Chat, ChatId, UserId};
use campusnet_types::error::RepositoryError;

use super::CliError;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ChatCommand {
    /// Create a chat between two or more users.
    Create {
        /// Chat name.
        name: String,

        /// Member user id (repeat for each member).
        #[arg(long = "member", required = true)]
        members: Vec<UserId>,
    },

    /// Add a user to an existing chat.
    Join {
        chat_id: ChatId,
        user_id: UserId,
    },

    /// List the members of a chat.
    Members { chat_id: ChatId },
}

pub async fn handle_chat_command(cmd: ChatCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ChatCommand::Create { name, members } => create_chat(state, &name, members, json).await,
        ChatCommand::Join { chat_id, user_id } => join_chat(state, &chat_id, &user_id, json).await,
        ChatCommand::Members { chat_id } => list_members(state, &chat_id, json).await,
    }
}

async fn create_chat(
    state: &AppState,
    name: &str,
    mut members: Vec<UserId>,
    json: bool,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidInput("chat name cannot be empty".to_string()).into());
    }
    members.sort();
    members.dedup();
    if members.len() < 2 {
        return Err(
            CliError::InvalidInput("a chat needs at least two distinct members".to_string()).into(),
        );
    }

    let now = Utc::now();
    let chat = Chat {
        id: ChatId::new(),
        name: name.to_string(),
        active_chunk_id: None,
        created_at: now,
        updated_at: now,
    };
    let chat = state
        .chats
        .create_chat(&chat, &members)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                CliError::NotFound("one or more members are not registered users".to_string()).into()
            }
            other => anyhow::Error::new(other),
        })?;

    if json {
        let result = serde_json::json!({
            "chat": chat,
            "members": members,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Created chat '{}' with {} members",
            style("ok").green(),
            style(&chat.name).cyan(),
            members.len()
        );
        println!("  {} {}", style("id").dim(), chat.id);
        println!();
    }

    Ok(())
}

async fn join_chat(state: &AppState, chat_id: &ChatId, user_id: &UserId, json: bool) -> Result<()> {
    state
        .chats
        .add_member(chat_id, user_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                CliError::NotFound(format!("chat {chat_id} or user {user_id} not found")).into()
            }
            RepositoryError::Conflict(_) => {
                CliError::InvalidInput(format!("user {user_id} is already a member")).into()
            }
            other => anyhow::Error::new(other),
        })?;

    if json {
        let result = serde_json::json!({
            "chat_id": chat_id,
            "user_id": user_id,
            "joined": true,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!("  {} User {} joined chat {}", style("ok").green(), user_id, chat_id);
        println!();
    }

    Ok(())
}

async fn list_members(state: &AppState, chat_id: &ChatId, json: bool) -> Result<()> {
    if state.chats.get_chat(chat_id).await?.is_none() {
        return Err(CliError::NotFound(format!("chat {chat_id} not found")).into());
    }
    let members = state.chats.list_members(chat_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&members)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("User ID").fg(Color::White),
    ]);
    for user in &members {
        table.add_row(vec![
            Cell::new(&user.display_name).fg(Color::Cyan),
            Cell::new(user.id).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} member{}",
        style(members.len()).bold(),
        if members.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}
