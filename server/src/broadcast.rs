//! Fan-out of server events to sessions
//!
//! Every event is serialized exactly once and the resulting frame is shared
//! between all recipients. Delivery is a non-blocking push onto each
//! session's bounded queue, so one slow session can never hold up the others:
//! a full queue drops the frame for that session only, and a session whose
//! writer has already gone away is skipped. Neither case is reported to the
//! caller as an error. Sessions are never removed here; that only happens when
//! the transport reports the close.

use crate::client_manager::{Client, ClientManager, Outgoing};
use log::{debug, error, warn};
use shared::{encode_server_packet, ServerPacket};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Outcome of one fan-out, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
}

fn serialize(packet: &ServerPacket) -> Option<Outgoing> {
    match encode_server_packet(packet) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            error!("Failed to serialize {:?}: {}", packet, e);
            None
        }
    }
}

/// Queues a frame for a single session. Returns whether it was accepted.
fn deliver(client: &Client, frame: &Outgoing) -> bool {
    let client_id = client.id;
    if !client.is_open() {
        debug!("Skipping client {}: not open", client_id);
        return false;
    }

    match client.sender.try_send(Arc::clone(frame)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Dropping frame for client {}: send queue full", client_id);
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Skipping client {}: closed during send", client_id);
            false
        }
    }
}

/// Sends `packet` to every session currently tracked by `clients`.
pub fn broadcast(clients: &ClientManager, packet: &ServerPacket) -> Delivery {
    let Some(frame) = serialize(packet) else {
        return Delivery::default();
    };

    let mut delivery = Delivery::default();
    for client in clients.iter() {
        if deliver(client, &frame) {
            delivery.delivered += 1;
        } else {
            delivery.skipped += 1;
        }
    }
    delivery
}

/// Sends `packet` to one session only.
pub fn send_to(clients: &ClientManager, client_id: u32, packet: &ServerPacket) -> bool {
    let Some(client) = clients.get(client_id) else {
        return false;
    };
    match serialize(packet) {
        Some(frame) => deliver(client, &frame),
        None => false,
    }
}
