//! Chunk inspection subcommands.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use campusnet_types::chat::{ChatId, ChunkId};
use campusnet_types::error::AppendError;

use super::short_id;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ChunkCommand {
    /// Show a chat's chunk chain, newest first.
    Chain { chat_id: ChatId },

    /// List chunks stored for a chat that its chain does not reach.
    Orphans { chat_id: ChatId },
}

pub async fn handle_chunk_command(cmd: ChunkCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ChunkCommand::Chain { chat_id } => show_chain(state, &chat_id, json).await,
        ChunkCommand::Orphans { chat_id } => show_orphans(state, &chat_id, json).await,
    }
}

async fn show_chain(state: &AppState, chat_id: &ChatId, json: bool) -> Result<()> {
    let chain = state.append_service.chunk_chain(chat_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
        return Ok(());
    }

    if chain.is_empty() {
        println!();
        println!(
            "  {} Chat {} has no chunks yet",
            style("i").blue().bold(),
            style(chat_id).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Chunk").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Weight").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Previous").fg(Color::White),
        Cell::new("Next").fg(Color::White),
    ]);

    let link = |id: Option<ChunkId>| id.map(short_id).unwrap_or_else(|| "-".to_string());
    for (i, chunk) in chain.iter().enumerate() {
        let state_cell = if chunk.is_full {
            Cell::new("○ full").fg(Color::Yellow)
        } else if i == 0 {
            Cell::new("● active").fg(Color::Green)
        } else {
            Cell::new("◌ open").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(short_id(chunk.id)).fg(Color::Cyan),
            Cell::new(chunk.len()),
            Cell::new(format!("{}/{}", chunk.current_weight, chunk.capacity_weight)),
            state_cell,
            Cell::new(link(chunk.previous_chunk_id)).fg(Color::DarkGrey),
            Cell::new(link(chunk.next_chunk_id)).fg(Color::DarkGrey),
        ]);
    }

    let total: usize = chain.iter().map(|c| c.len()).sum();
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} chunk{}, {} message{}",
        style(chain.len()).bold(),
        if chain.len() == 1 { "" } else { "s" },
        style(total).bold(),
        if total == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

async fn show_orphans(state: &AppState, chat_id: &ChatId, json: bool) -> Result<()> {
    let orphans = state
        .append_service
        .coordinator()
        .unreachable_chunks(chat_id)
        .await
        .map_err(AppendError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&orphans)?);
        return Ok(());
    }

    println!();
    if orphans.is_empty() {
        println!("  {} Every chunk is reachable from the active chunk", style("ok").green());
    } else {
        for id in &orphans {
            println!("  {} {}", style("orphan").yellow(), id);
        }
    }
    println!();

    Ok(())
}
