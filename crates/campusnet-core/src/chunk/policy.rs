//! Chunk sizing policy: message weights and the capacity checks built on them.
//!
//! Pure and stateless apart from the configured weight table. Rich content
//! (media, posts, events) consumes more of a chunk's budget than plain text.

use campusnet_types::chat::MessageKind;
use campusnet_types::config::ChunkingConfig;
use campusnet_types::error::ChunkError;

/// Maps message kinds to weights and decides when a chunk is full.
#[derive(Debug, Clone)]
pub struct ChunkSizingPolicy {
    config: ChunkingConfig,
}

impl ChunkSizingPolicy {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Capacity given to newly created chunks.
    pub fn capacity_weight(&self) -> u32 {
        self.config.capacity_weight
    }

    /// Largest weight a single message can carry.
    pub fn max_single_weight(&self) -> u32 {
        self.config.max_single_weight()
    }

    pub fn weight_of(&self, kind: MessageKind) -> u32 {
        self.config.weight_of(kind)
    }

    /// `current + weight(kind) > capacity`.
    pub fn would_overflow(&self, current_weight: u32, capacity_weight: u32, kind: MessageKind) -> bool {
        current_weight.saturating_add(self.weight_of(kind)) > capacity_weight
    }

    /// `current + weight(kind) >= capacity`: the add that reaches capacity seals the chunk.
    pub fn would_fill(&self, current_weight: u32, capacity_weight: u32, kind: MessageKind) -> bool {
        current_weight.saturating_add(self.weight_of(kind)) >= capacity_weight
    }

    /// Fails with `MessageTooLarge` if `kind` alone exceeds a fresh chunk's capacity.
    pub fn check_fits_empty_chunk(&self, kind: MessageKind) -> Result<u32, ChunkError> {
        let weight = self.weight_of(kind);
        let capacity = self.capacity_weight();
        if weight > capacity {
            return Err(ChunkError::MessageTooLarge { weight, capacity });
        }
        Ok(weight)
    }
}

impl Default for ChunkSizingPolicy {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}
