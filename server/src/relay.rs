//! Session relay: the per-connection protocol state machine
//!
//! The relay owns every piece of shared state (live sessions, player
//! registry, chat log) and is the only thing that mutates it. It is driven
//! from a single dispatch loop, one event at a time, so no event ever sees
//! another half-applied.
//!
//! ## Session lifecycle
//! - **connect**: the session is registered open and unbound, and receives an
//!   `init` snapshot of the registry plus the most recent chat lines.
//! - **join**: binds the session to a player id, stores the player's state and
//!   announces it to everyone, the sender included.
//! - **update**: merges into the bound player's state and announces the merged
//!   result. Ignored for unbound sessions.
//! - **chat**: stamped with server time, logged, and announced.
//! - **close**: the bound player, if still registered, is removed and its
//!   departure announced.
//!
//! Nothing is ever reported back to the sender as an error: malformed frames
//! are logged and dropped, semantically invalid ones are silently ignored.
//!
//! ## Shared player ids
//! Player ids are chosen by clients and never checked for collisions. If two
//! live sessions join with the same id, the later join replaces the registry
//! entry and both sessions keep their binding; whichever closes first removes
//! the entry and announces the departure. This is logged but otherwise left
//! alone.

use crate::broadcast::{broadcast, send_to};
use crate::chat_log::ChatLog;
use crate::client_manager::{ClientManager, Outgoing};
use crate::registry::PlayerRegistry;
use crate::utils::get_timestamp;
use log::{debug, error, info, warn};
use shared::{
    decode_client_packet, ChatMessage, ClientPacket, PlayerId, PlayerState, ServerPacket,
    CHAT_HISTORY_ON_CONNECT, CHAT_LOG_CAPACITY,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tunables for the relay and its sessions.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Cap on concurrently open sessions; `None` accepts every session
    pub max_clients: Option<usize>,
    /// How many chat messages the log retains
    pub chat_capacity: usize,
    /// How many of those a newly connected session is sent
    pub chat_history_on_connect: usize,
    /// Frames buffered per session before new ones are dropped
    pub send_queue: usize,
    /// Upper bound on a single frame write to a session
    pub send_timeout: Duration,
    /// Inbound events buffered for the dispatch loop before readers wait
    pub event_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_clients: None,
            chat_capacity: CHAT_LOG_CAPACITY,
            chat_history_on_connect: CHAT_HISTORY_ON_CONNECT,
            send_queue: 256,
            send_timeout: Duration::from_secs(5),
            event_queue: 1024,
        }
    }
}

pub struct Relay {
    clients: ClientManager,
    registry: PlayerRegistry,
    chat_log: ChatLog,
    history_on_connect: usize,
}

impl Relay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            clients: ClientManager::new(config.max_clients),
            registry: PlayerRegistry::new(),
            chat_log: ChatLog::new(config.chat_capacity),
            history_on_connect: config.chat_history_on_connect,
        }
    }

    /// Registers a new session and sends it the current world snapshot.
    ///
    /// Returns false only when a session cap is configured and reached; the
    /// refused session's queue is dropped, which makes the writer close it.
    pub fn on_connect(
        &mut self,
        client_id: u32,
        addr: SocketAddr,
        sender: mpsc::Sender<Outgoing>,
    ) -> bool {
        if !self.clients.add_client(client_id, addr, sender) {
            warn!(
                "Refusing client {} from {}: session cap reached ({} sessions)",
                client_id,
                addr,
                self.clients.len()
            );
            return false;
        }

        let init = ServerPacket::Init {
            players: self.registry.snapshot(),
            chat_history: self.chat_log.recent(self.history_on_connect),
        };
        send_to(&self.clients, client_id, &init);
        true
    }

    /// Decodes one inbound text frame and applies it.
    pub fn on_message(&mut self, client_id: u32, raw: &str) {
        if self.clients.get(client_id).is_none() {
            debug!("Ignoring frame from unregistered client {}", client_id);
            return;
        }

        let packet = match decode_client_packet(raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping malformed frame from client {}: {}", client_id, e);
                return;
            }
        };

        match packet {
            ClientPacket::Join { id, player } => self.handle_join(client_id, id, player),
            ClientPacket::Update { player } => self.handle_update(client_id, player),
            ClientPacket::Chat {
                author,
                message,
                color,
            } => self.handle_chat(author, message, color),
            ClientPacket::Unknown => {
                debug!("Ignoring unknown event kind from client {}", client_id);
            }
        }
    }

    /// Forgets a closed session and announces its player's departure.
    pub fn on_close(&mut self, client_id: u32) {
        let Some(client) = self.clients.remove_client(client_id) else {
            return;
        };
        let Some(player_id) = client.player_id else {
            return;
        };

        if self.registry.remove(&player_id).is_some() {
            info!("Player {} left (client {})", player_id, client_id);
            broadcast(&self.clients, &ServerPacket::PlayerLeft { id: player_id });
        }
    }

    /// Transport errors are only reported; the transport closes the session.
    pub fn on_error(&mut self, client_id: u32, error: &str) {
        error!("Transport error on client {}: {}", client_id, error);
    }

    fn handle_join(&mut self, client_id: u32, id: PlayerId, player: PlayerState) {
        let others = self.clients.clients_bound_to(&id, client_id);
        if !others.is_empty() {
            warn!(
                "Player id {} joined from client {} while bound to clients {:?}",
                id, client_id, others
            );
        }

        if let Some(previous) = self.clients.bind_player(client_id, id.clone()) {
            if previous != id {
                debug!(
                    "Client {} rebound from player {} to {}",
                    client_id, previous, id
                );
            }
        }

        self.registry.put(id.clone(), player.clone());
        info!("Player {} joined (client {})", id, client_id);
        broadcast(&self.clients, &ServerPacket::PlayerJoined { id, player });
    }

    fn handle_update(&mut self, client_id: u32, partial: PlayerState) {
        let Some(id) = self.clients.player_of(client_id).cloned() else {
            debug!("Ignoring update from unbound client {}", client_id);
            return;
        };
        let Some(merged) = self.registry.merge(&id, partial) else {
            debug!("Ignoring update for unregistered player {}", id);
            return;
        };

        let packet = ServerPacket::PlayerUpdate {
            id,
            player: merged.clone(),
        };
        broadcast(&self.clients, &packet);
    }

    fn handle_chat(&mut self, author: Value, message: Value, color: Value) {
        let timestamp = get_timestamp().max(self.chat_log.last_timestamp().unwrap_or(0));

        let msg = ChatMessage {
            author,
            message,
            color,
            timestamp,
        };
        self.chat_log.append(msg.clone());
        broadcast(&self.clients, &msg.into());
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.chat_log
    }
}
