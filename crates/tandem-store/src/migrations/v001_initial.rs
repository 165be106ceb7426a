//! v001 -- Initial schema creation.
//!
//! Creates the engine tables: `profiles`, `interactions`, `quota_records`,
//! `matches`, `conversations`, and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (moderation flags, mirrored from the moderation service)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID
    active     INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    banned     INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at TEXT NOT NULL,               -- RFC-3339, microseconds, UTC
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Interactions (one row per ordered actor -> target pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS interactions (
    actor_id   TEXT NOT NULL,               -- FK -> profiles(id)
    target_id  TEXT NOT NULL,               -- FK -> profiles(id)
    direction  TEXT NOT NULL CHECK (direction IN ('like', 'pass', 'super_like')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (actor_id, target_id),
    CHECK (actor_id <> target_id),
    FOREIGN KEY (actor_id) REFERENCES profiles(id),
    FOREIGN KEY (target_id) REFERENCES profiles(id)
);

CREATE INDEX IF NOT EXISTS idx_interactions_target ON interactions(target_id);

-- ----------------------------------------------------------------
-- Daily quota counters (one row per profile per UTC day)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS quota_records (
    profile_id TEXT NOT NULL,               -- FK -> profiles(id)
    day_key    TEXT NOT NULL,               -- YYYY-MM-DD (UTC)
    count      INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (profile_id, day_key)
);

-- ----------------------------------------------------------------
-- Matches (canonical pair ordering: low < high)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    profile_low_id  TEXT NOT NULL,              -- FK -> profiles(id)
    profile_high_id TEXT NOT NULL,              -- FK -> profiles(id)
    created_at      TEXT NOT NULL,
    unmatched_at    TEXT,
    unmatched_by    TEXT,                       -- NULL when ended by moderation

    UNIQUE (profile_low_id, profile_high_id),
    CHECK (profile_low_id < profile_high_id),
    FOREIGN KEY (profile_low_id) REFERENCES profiles(id),
    FOREIGN KEY (profile_high_id) REFERENCES profiles(id)
);

CREATE INDEX IF NOT EXISTS idx_matches_high ON matches(profile_high_id);

-- ----------------------------------------------------------------
-- Conversations (exactly one per match)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id                   TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    match_id             TEXT NOT NULL UNIQUE,       -- FK -> matches(id)
    created_at           TEXT NOT NULL,
    last_message_at      TEXT,
    last_message_preview TEXT,
    expires_at           TEXT,
    expired              INTEGER NOT NULL DEFAULT 0, -- cached, boolean 0/1

    FOREIGN KEY (match_id) REFERENCES matches(id)
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,              -- FK -> profiles(id)
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL,              -- strictly increasing per conversation
    read_at         TEXT,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_order
    ON messages(conversation_id, created_at, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
