//! Infrastructure layer for CampusNet.
//!
//! Contains implementations of the repository traits defined in `campusnet-core`:
//! SQLite storage for chunks, chats, and messages, plus configuration loading
//! and data directory resolution.

pub mod config;
pub mod filesystem;
pub mod sqlite;
