//! Shared domain types for CampusNet messaging.
//!
//! This crate contains the core domain types used across the platform:
//! chats, users, messages, chunk placement results, configuration, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
