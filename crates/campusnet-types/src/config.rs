//! Global configuration types for CampusNet.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! chunk sizing and logging.

use serde::{Deserialize, Serialize};

use crate::chat::MessageKind;

/// Top-level configuration.
///
/// Loaded from `~/.campusnet/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Weight budget and per-kind weights for message chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum weight a chunk holds before it is sealed.
    #[serde(default = "default_capacity_weight")]
    pub capacity_weight: u32,

    #[serde(default = "default_text_weight")]
    pub text_weight: u32,

    #[serde(default = "default_rich_weight")]
    pub media_weight: u32,

    #[serde(default = "default_rich_weight")]
    pub post_weight: u32,

    #[serde(default = "default_rich_weight")]
    pub event_weight: u32,

    /// How many times a chunk write is attempted before giving up.
    #[serde(default = "default_persist_attempts")]
    pub persist_attempts: u32,

    /// How many times a placement re-reads and retries after another writer
    /// changed the chunk or pointer first.
    #[serde(default = "default_conflict_attempts")]
    pub conflict_attempts: u32,
}

fn default_capacity_weight() -> u32 {
    50
}

fn default_text_weight() -> u32 {
    1
}

fn default_rich_weight() -> u32 {
    10
}

fn default_persist_attempts() -> u32 {
    3
}

fn default_conflict_attempts() -> u32 {
    32
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            capacity_weight: default_capacity_weight(),
            text_weight: default_text_weight(),
            media_weight: default_rich_weight(),
            post_weight: default_rich_weight(),
            event_weight: default_rich_weight(),
            persist_attempts: default_persist_attempts(),
            conflict_attempts: default_conflict_attempts(),
        }
    }
}

impl ChunkingConfig {
    /// Configured weight for a message kind.
    pub fn weight_of(&self, kind: MessageKind) -> u32 {
        match kind {
            MessageKind::Text => self.text_weight,
            MessageKind::Media => self.media_weight,
            MessageKind::Post => self.post_weight,
            MessageKind::Event => self.event_weight,
        }
    }

    /// Largest weight any single message can have.
    pub fn max_single_weight(&self) -> u32 {
        MessageKind::ALL
            .iter()
            .map(|k| self.weight_of(*k))
            .max()
            .unwrap_or(0)
    }

    /// Reject configurations that would break chunk accounting.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_weight == 0 {
            return Err("chunking.capacity_weight must be greater than 0".to_string());
        }
        for kind in MessageKind::ALL {
            if self.weight_of(kind) == 0 {
                return Err(format!("chunking weight for '{kind}' must be greater than 0"));
            }
        }
        if self.persist_attempts == 0 {
            return Err("chunking.persist_attempts must be at least 1".to_string());
        }
        if self.conflict_attempts == 0 {
            return Err("chunking.conflict_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Bridge tracing spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}
