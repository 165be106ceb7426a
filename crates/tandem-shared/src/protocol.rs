//! Realtime wire protocol spoken over a conversation's live channel.
//!
//! Frames are JSON text, tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SharedError;
use crate::types::{ConversationId, MessageId, ProfileId};

/// A persisted chat message as delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: ProfileId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Why a live conversation channel was closed by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Unmatched,
    Blocked,
    Moderation,
}

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "message.created")]
    MessageCreated { message: MessageView },

    #[serde(rename = "typing")]
    Typing {
        conversation_id: ConversationId,
        profile_id: ProfileId,
        emitted_at: DateTime<Utc>,
    },

    #[serde(rename = "messages.read")]
    MessagesRead {
        conversation_id: ConversationId,
        reader_id: ProfileId,
        read_at: DateTime<Utc>,
        count: u64,
    },

    #[serde(rename = "conversation.closed")]
    ConversationClosed {
        conversation_id: ConversationId,
        reason: CloseReason,
    },
}

impl ServerEvent {
    /// Typing signals are best-effort and may be dropped under load.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Typing { .. })
    }

    pub fn to_json(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Events pushed by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "typing")]
    Typing,
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, SharedError> {
        Ok(serde_json::from_str(text)?)
    }
}
