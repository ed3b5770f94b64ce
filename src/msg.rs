//! Wire envelopes for the real-time channel.

use serde::{Deserialize, Serialize};

use crate::hub::RoomId;

/// Inbound frame from either participant.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub room_id: RoomId,
    pub from: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    CustomerLeft,
    AgentLeft,
    Closed,
}

/// Outbound frame, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Message(ChatMessage),
    RoomJoined { room_id: RoomId },
    ChatEnded { room_id: RoomId, reason: EndReason },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}
