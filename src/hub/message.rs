// Chat message types
// Frames are decoded once at the connection boundary, tagged with the
// server-side sender identity, then published as outbound frames

use serde::{Deserialize, Serialize};

/// Sender id and username used for hub-originated notices
pub const SYSTEM_SENDER: &str = "system";

/// Inbound frame, discriminated by the `action` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ClientFrame {
    /// Client announces the display name it wants to use
    #[serde(rename = "INITIAL_CONNECTION")]
    InitialConnection { username: String },

    /// Client posts a chat message
    #[serde(rename = "WRITE_MESSAGE")]
    WriteMessage { body: String },
}

/// Message after the hub has attached the canonical sender identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Join {
        sender_id: String,
        display_name: String,
    },
    Write {
        sender_id: String,
        display_name: String,
        body: String,
    },
}

impl Message {
    /// Frame sent to every member. A join becomes a system notice.
    pub fn to_frame(&self) -> OutboundFrame {
        match self {
            Message::Join { display_name, .. } => OutboundFrame {
                sender_id: SYSTEM_SENDER.to_string(),
                username: SYSTEM_SENDER.to_string(),
                body: format!("{} joined", display_name),
            },
            Message::Write {
                sender_id,
                display_name,
                body,
            } => OutboundFrame {
                sender_id: sender_id.clone(),
                username: display_name.clone(),
                body: body.clone(),
            },
        }
    }
}

/// Outbound frame as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(rename = "senderID")]
    pub sender_id: String,
    pub username: String,
    pub body: String,
}
