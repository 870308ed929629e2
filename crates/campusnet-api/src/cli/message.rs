//! Message subcommands: send, delete, and read a chat's history.
//!
//! All three go through `MessageAppendService`, so membership, kind
//! validation, and chunk placement are enforced the same way for every caller.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use campusnet_types::chat::{ChatId, DraftMessage, MessageId, MessageKind, UserId};

use super::short_id;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum MessageCommand {
    /// Send a message into a chat.
    Send {
        chat_id: ChatId,

        /// Sender user id.
        #[arg(long)]
        user: UserId,

        /// Message kind: text, media, post, or event.
        #[arg(long, default_value = "text")]
        kind: String,

        /// Message content.
        content: String,
    },

    /// Delete one of your own messages.
    #[command(alias = "rm")]
    Delete {
        message_id: MessageId,

        /// The user asking for the delete (must be the sender).
        #[arg(long)]
        user: UserId,
    },

    /// Show a chat's messages, oldest first.
    History {
        chat_id: ChatId,

        /// Reading user id (must be a member).
        #[arg(long)]
        user: UserId,
    },
}

pub async fn handle_message_command(
    cmd: MessageCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        MessageCommand::Send {
            chat_id,
            user,
            kind,
            content,
        } => send_message(state, &chat_id, &user, kind, content, json).await,
        MessageCommand::Delete { message_id, user } => {
            delete_message(state, &message_id, &user, json).await
        }
        MessageCommand::History { chat_id, user } => history(state, &chat_id, &user, json).await,
    }
}

async fn send_message(
    state: &AppState,
    chat_id: &ChatId,
    user_id: &UserId,
    kind: String,
    content: String,
    json: bool,
) -> Result<()> {
    let message = state
        .append_service
        .append_message(user_id, chat_id, DraftMessage::new(kind, content))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!();
        println!(
            "  {} Sent {} message {}",
            style("ok").green(),
            style(message.kind).cyan(),
            style(short_id(message.id)).dim()
        );
        println!("  {} {}", style("chunk").dim(), message.chunk_id);
        println!();
    }

    Ok(())
}

async fn delete_message(
    state: &AppState,
    message_id: &MessageId,
    user_id: &UserId,
    json: bool,
) -> Result<()> {
    state
        .append_service
        .delete_message(user_id, message_id)
        .await?;

    if json {
        let result = serde_json::json!({
            "message_id": message_id,
            "deleted": true,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!("  {} Deleted message {}", style("ok").green(), message_id);
        println!();
    }

    Ok(())
}

async fn history(state: &AppState, chat_id: &ChatId, user_id: &UserId, json: bool) -> Result<()> {
    let messages = state.append_service.chat_history(user_id, chat_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages yet. Send one with: {}",
            style("i").blue().bold(),
            style("campus message send").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Sent").fg(Color::White),
        Cell::new("Sender").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Chunk").fg(Color::White),
    ]);

    for message in &messages {
        let kind_cell = match message.kind {
            MessageKind::Text => Cell::new("text"),
            MessageKind::Media => Cell::new("media").fg(Color::Magenta),
            MessageKind::Post => Cell::new("post").fg(Color::Blue),
            MessageKind::Event => Cell::new("event").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(message.created_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(short_id(message.sender_id)).fg(Color::Cyan),
            kind_cell,
            Cell::new(&message.content),
            Cell::new(short_id(message.chunk_id)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} message{}",
        style(messages.len()).bold(),
        if messages.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}
