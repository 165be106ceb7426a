//! Domain records persisted in the engine database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tandem_shared::expiry;
use tandem_shared::protocol::MessageView;
use tandem_shared::types::{
    ConversationId, Direction, MatchId, MessageId, ProfileId, ProfileStatus,
};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub status: ProfileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// A swipe. At most one per ordered `(actor_id, target_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interaction {
    pub actor_id: ProfileId,
    pub target_id: ProfileId,
    pub direction: Direction,
    /// First swipe on this target.
    pub created_at: DateTime<Utc>,
    /// Latest change of direction.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub profile_low_id: ProfileId,
    pub profile_high_id: ProfileId,
    pub created_at: DateTime<Utc>,
    pub unmatched_at: Option<DateTime<Utc>>,
    /// `None` on an unmatched row means moderation ended it.
    pub unmatched_by: Option<ProfileId>,
}

impl Match {
    pub fn is_participant(&self, id: ProfileId) -> bool {
        self.profile_low_id == id || self.profile_high_id == id
    }

    pub fn counterpart(&self, id: ProfileId) -> Option<ProfileId> {
        if id == self.profile_low_id {
            Some(self.profile_high_id)
        } else if id == self.profile_high_id {
            Some(self.profile_low_id)
        } else {
            None
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.unmatched_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub match_id: MatchId,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Cached once expiry has been observed.
    pub expired: bool,
}

impl Conversation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired || expiry::is_expired(self.expires_at, self.last_message_at, now)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: ProfileId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub client_token: Option<String>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        MessageView {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            content: m.content,
            created_at: m.created_at,
            read_at: m.read_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub blocker_id: ProfileId,
    pub blocked_id: ProfileId,
    pub created_at: DateTime<Utc>,
}
