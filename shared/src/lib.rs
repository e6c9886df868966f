use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const CHAT_LOG_CAPACITY: usize = 100;
pub const CHAT_HISTORY_ON_CONNECT: usize = 50;

/// Client-chosen player identifier. Never validated for uniqueness.
pub type PlayerId = String;

/// Opaque per-player payload (position, colour, ...). Only ever merged
/// field-by-field at the top level.
pub type PlayerState = serde_json::Map<String, Value>;

/// Events a client may send. Every frame carries a `type` discriminator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientPacket {
    Join {
        id: PlayerId,
        #[serde(default)]
        player: PlayerState,
    },
    Update {
        #[serde(default)]
        player: PlayerState,
    },
    /// Chat fields are relayed as sent, whatever their JSON type; absent
    /// ones become `null`.
    Chat {
        #[serde(default)]
        author: Value,
        #[serde(default)]
        message: Value,
        #[serde(default)]
        color: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Events the server pushes to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerPacket {
    Init {
        players: HashMap<PlayerId, PlayerState>,
        #[serde(rename = "chatHistory")]
        chat_history: Vec<ChatMessage>,
    },
    PlayerJoined {
        id: PlayerId,
        player: PlayerState,
    },
    PlayerUpdate {
        id: PlayerId,
        player: PlayerState,
    },
    PlayerLeft {
        id: PlayerId,
    },
    Chat {
        author: Value,
        message: Value,
        color: Value,
        timestamp: u64,
    },
}

/// A chat line as stored in the log. Serialized with its own `"type": "chat"`
/// so history entries look exactly like live chat events.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename = "chat")]
pub struct ChatMessage {
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub color: Value,
    /// Milliseconds since the Unix epoch, assigned by the server on receipt.
    pub timestamp: u64,
}

impl From<ChatMessage> for ServerPacket {
    fn from(msg: ChatMessage) -> Self {
        ServerPacket::Chat {
            author: msg.author,
            message: msg.message,
            color: msg.color,
            timestamp: msg.timestamp,
        }
    }
}

pub fn decode_client_packet(text: &str) -> Result<ClientPacket, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn encode_server_packet(packet: &ServerPacket) -> Result<String, serde_json::Error> {
    serde_json::to_string(packet)
}
