use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Blocks are directed; either direction closes the pair.
CREATE TABLE IF NOT EXISTS blocks (
    blocker_id TEXT NOT NULL,                 -- FK -> profiles(id)
    blocked_id TEXT NOT NULL,                 -- FK -> profiles(id)
    created_at TEXT NOT NULL,

    PRIMARY KEY (blocker_id, blocked_id)
);

CREATE INDEX IF NOT EXISTS idx_blocks_blocked ON blocks(blocked_id);

-- Client-supplied idempotency token for message sends
ALTER TABLE messages ADD COLUMN client_token TEXT;

CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_token
    ON messages(conversation_id, sender_id, client_token)
    WHERE client_token IS NOT NULL;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
