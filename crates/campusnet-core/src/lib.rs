//! Business logic and repository trait definitions for CampusNet messaging.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, plus the message-chunking policy and the services built
//! on it. It depends only on `campusnet-types` -- never on `campusnet-infra`
//! or any database/IO crate.

pub mod chat;
pub mod chunk;

#[cfg(test)]
pub(crate) mod testing;
