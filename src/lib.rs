#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Shardfish Server
//!
//! A multi-service shard server for MOUL-lineage MMO clients: one lobby
//! socket dispatching to gatekeeper, file, auth, and game services over the
//! legacy encrypted wire protocol, backed by PostgreSQL.

/// Auth service, daemon, and vault database access
pub mod auth;

/// Configuration loading and validation
pub mod config;

/// Error and result-code types
pub mod errors;

/// File service and manifest handling
pub mod file;

/// Game service, per-age hosts, and age descriptors
pub mod game;

/// Gatekeeper service
pub mod gate;

/// Structured logging configuration
pub mod logging;

/// Lobby, crypto transport, channels, and the status endpoint
pub mod net;

/// The client object model: streams, keys, and the creatable registry
pub mod plasma;

/// State Description Language support
pub mod sdl;

/// Server orchestration and shared state
pub mod server;

/// Shared value types with legacy wire encodings
pub mod types;

/// The persistent node/ref graph
pub mod vault;
