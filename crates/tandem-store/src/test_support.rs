//! Fixtures for store tests.

use chrono::Utc;

use tandem_shared::types::{ConversationId, PairKey, ProfileId, ProfileStatus};

use crate::{conversations, matches, profiles, Database};

pub(crate) fn test_db() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

pub(crate) fn profile(db: &Database) -> ProfileId {
    let id = ProfileId::new();
    profiles::upsert(
        db.conn(),
        id,
        ProfileStatus { active: true, banned: false },
        Utc::now(),
    )
    .expect("insert profile");
    id
}

/// A matched pair with its conversation.
pub(crate) fn conversation(db: &Database) -> (ConversationId, ProfileId, ProfileId) {
    let a = profile(db);
    let b = profile(db);
    let pair = PairKey::new(a, b).expect("distinct profiles");
    let (m, _) = matches::insert_if_absent(db.conn(), pair, Utc::now()).expect("match");
    let (conv, _) =
        conversations::insert_if_absent(db.conn(), m.id, None, Utc::now()).expect("conversation");
    (conv.id, a, b)
}
