//! Conversation rows, exactly one per match.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use tandem_shared::types::{ConversationId, MatchId};

use crate::columns::{get_opt_ts, get_ts, get_uuid, opt_ts, ts};
use crate::error::{Result, StoreError};
use crate::models::Conversation;

const COLUMNS: &str = "id, match_id, created_at, last_message_at, last_message_preview, \
                       expires_at, expired";

pub fn get(conn: &Connection, id: ConversationId) -> Result<Option<Conversation>> {
    let found = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"),
            params![id.to_string()],
            row_to_conversation,
        )
        .optional()?;
    Ok(found)
}

pub fn for_match(conn: &Connection, match_id: MatchId) -> Result<Option<Conversation>> {
    let found = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM conversations WHERE match_id = ?1"),
            params![match_id.to_string()],
            row_to_conversation,
        )
        .optional()?;
    Ok(found)
}

/// Create the conversation for `match_id` unless it exists. Returns the row
/// and whether this call created it.
pub fn insert_if_absent(
    conn: &Connection,
    match_id: MatchId,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(Conversation, bool)> {
    let inserted = conn.execute(
        "INSERT INTO conversations (id, match_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(match_id) DO NOTHING",
        params![
            ConversationId::new().to_string(),
            match_id.to_string(),
            ts(now),
            opt_ts(expires_at),
        ],
    )?;

    let row = for_match(conn, match_id)?.ok_or(StoreError::NotFound)?;
    Ok((row, inserted == 1))
}

pub fn record_activity(
    conn: &Connection,
    id: ConversationId,
    preview: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let affected = conn.execute(
        "UPDATE conversations SET last_message_at = ?1, last_message_preview = ?2
         WHERE id = ?3",
        params![ts(at), preview, id.to_string()],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Cache an observed expiry.
pub fn mark_expired(conn: &Connection, id: ConversationId) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET expired = 1 WHERE id = ?1 AND expired = 0",
        params![id.to_string()],
    )?;
    Ok(())
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: ConversationId(get_uuid(row, 0)?),
        match_id: MatchId(get_uuid(row, 1)?),
        created_at: get_ts(row, 2)?,
        last_message_at: get_opt_ts(row, 3)?,
        last_message_preview: row.get(4)?,
        expires_at: get_opt_ts(row, 5)?,
        expired: row.get(6)?,
    })
}
