//! Chat membership and message persistence, and the append service that
//! places messages into chunks.

pub mod repository;
pub mod service;
