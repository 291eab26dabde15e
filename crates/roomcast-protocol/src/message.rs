use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire discriminant for a chat message.
pub const MSG_TYPE_CHAT: u8 = 1;
/// Wire discriminant for an online-count info message.
pub const MSG_TYPE_INFO: u8 = 4;

/// One record on the wire, for both client⇄hub frames and backplane batches.
/// Wire: `{ "type": 1, "payload": { "chatMessage": {...} } }`
///
/// Exactly one of the payload variants is set; the other is omitted from the
/// encoding entirely (never null). Messages are immutable once constructed
/// and shared as `Arc<Message>` across every consumer of a broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: u8,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "chatMessage", skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatMessage>,
    #[serde(rename = "infoMessage", skip_serializing_if = "Option::is_none")]
    pub info: Option<InfoMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoMessage {
    #[serde(rename = "onlineCount")]
    pub online_count: i64,
}

impl Message {
    /// A chat message stamped with the current time.
    pub fn chat(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            msg_type: MSG_TYPE_CHAT,
            payload: Payload {
                chat: Some(ChatMessage {
                    from: from.into(),
                    content: content.into(),
                    timestamp: Utc::now(),
                }),
                info: None,
            },
        }
    }

    /// An online-count announcement.
    pub fn info(online_count: i64) -> Self {
        Self {
            msg_type: MSG_TYPE_INFO,
            payload: Payload {
                chat: None,
                info: Some(InfoMessage { online_count }),
            },
        }
    }
}

/// Encode a batch as one JSON array payload — one write per flush, never one
/// write per message.
pub fn encode_batch(batch: &[Arc<Message>]) -> serde_json::Result<String> {
    let refs: Vec<&Message> = batch.iter().map(Arc::as_ref).collect();
    serde_json::to_string(&refs)
}

/// Decode one payload back into the ordered batch it was encoded from.
pub fn decode_batch(payload: &str) -> serde_json::Result<Vec<Message>> {
    serde_json::from_str(payload)
}
