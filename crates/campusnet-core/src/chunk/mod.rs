//! Message chunking: bounded, linked containers of message ids per chat.
//!
//! A chat's messages are grouped into chunks capped by a weight budget. The
//! newest chunk is the chat's active chunk; older chunks are reachable by
//! following `previous_chunk_id` links.

pub mod coordinator;
pub mod entity;
pub mod lock;
pub mod policy;
pub mod store;
