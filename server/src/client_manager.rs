//! Live session tracking for the relay
//!
//! This module keeps the set of currently connected sessions, including:
//! - The outbound queue each session's writer task drains
//! - The peer address, for logging
//! - The player identifier a session has bound itself to via `join`
//! - An optional cap on concurrent sessions
//!
//! A session stays here from the moment its transport opens until the
//! transport reports it closed; the broadcast path never prunes it.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// One already-serialized frame queued for delivery.
pub type Outgoing = Arc<str>;

/// Represents a connected session
#[derive(Debug)]
pub struct Client {
    /// Unique session identifier assigned by the accept loop
    pub id: u32,
    /// Network address of the peer
    pub addr: SocketAddr,
    /// When the transport opened
    pub connected_at: Instant,
    /// Player this session announced with `join`, if any
    pub player_id: Option<PlayerId>,
    /// Queue feeding this session's writer task
    pub sender: mpsc::Sender<Outgoing>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::Sender<Outgoing>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            player_id: None,
            sender,
        }
    }

    /// Readiness check before send: false once the writer side has gone away.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Manages all connected sessions
///
/// The ClientManager tracks which player identifier, if any, each session is
/// bound to. Sessions are unlimited unless a cap is configured.
pub struct ClientManager {
    /// Connected sessions indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Maximum number of concurrent sessions allowed, if capped
    max_clients: Option<usize>,
}

impl ClientManager {
    /// Creates a new client manager with an optional capacity limit
    pub fn new(max_clients: Option<usize>) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a freshly opened session as open and unbound.
    ///
    /// Returns false if a configured cap is reached or the id is already taken.
    pub fn add_client(
        &mut self,
        client_id: u32,
        addr: SocketAddr,
        sender: mpsc::Sender<Outgoing>,
    ) -> bool {
        let full = self
            .max_clients
            .is_some_and(|max| self.clients.len() >= max);
        if full || self.clients.contains_key(&client_id) {
            return false;
        }

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));
        true
    }

    /// Removes a session, returning it so the caller can clean up its player.
    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!(
            "Client {} disconnected after {:.1}s",
            client.id,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Binds a session to `player_id`, returning the id it was bound to before.
    ///
    /// Returns None as well when the session is unknown.
    pub fn bind_player(&mut self, client_id: u32, player_id: PlayerId) -> Option<PlayerId> {
        self.clients
            .get_mut(&client_id)
            .and_then(|client| client.player_id.replace(player_id))
    }

    pub fn player_of(&self, client_id: u32) -> Option<&PlayerId> {
        self.clients
            .get(&client_id)
            .and_then(|client| client.player_id.as_ref())
    }

    /// Sessions other than `except` currently bound to `player_id`.
    pub fn clients_bound_to(&self, player_id: &str, except: u32) -> Vec<u32> {
        self.clients
            .values()
            .filter(|client| client.id != except)
            .filter(|client| client.player_id.as_deref() == Some(player_id))
            .map(|client| client.id)
            .collect()
    }

    /// Every tracked session, open or not, for fan-out.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Returns the number of currently connected sessions
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no sessions are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
