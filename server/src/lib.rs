//! # Relay Server Library
//!
//! This library provides the state-relay server for a casual multiplayer
//! session. Clients connect over WebSocket, announce a player identity,
//! stream opaque state updates, and chat; the server fans every resulting
//! event out to all connected clients and keeps a bounded chat history for
//! late joiners.
//!
//! ## Core Responsibilities
//!
//! ### Session Relay
//! Runs the per-connection protocol: `join` binds a session to a player id,
//! `update` merges into that player's state, `chat` is stamped and logged,
//! and closing a session announces its player's departure. New sessions get
//! an `init` snapshot of every registered player plus recent chat.
//!
//! ### Broadcasting
//! Each event is serialized once and queued to every open session without
//! blocking. A slow or dead session only ever loses its own frames.
//!
//! ## Architecture Design
//!
//! ### Single Dispatch Loop
//! Every connection task forwards its inbound frames and lifecycle events
//! into one bounded channel, waiting when it is full. A single loop drains it
//! and owns all shared state, so registry, chat log and session set are never
//! observed half-updated and need no locks.
//!
//! ### Per-Session Writers
//! Each session has its own bounded outbound queue and writer task. Writes
//! are bounded by a timeout; a session that cannot keep up is disconnected
//! instead of stalling anyone else.
//!
//! ## Module Organization
//!
//! - `client_manager`: live sessions, their queues and player bindings
//! - `registry`: player id to current state
//! - `chat_log`: bounded recent chat
//! - `broadcast`: serialize-once fan-out
//! - `relay`: the protocol state machine tying the above together
//! - `network`: axum router, WebSocket sessions and the dispatch loop
//! - `status`: plain-HTTP status page on the same port
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::relay::RelayConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("0.0.0.0:8080", RelayConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod chat_log;
pub mod client_manager;
pub mod network;
pub mod registry;
pub mod relay;
pub mod status;
pub mod utils;
