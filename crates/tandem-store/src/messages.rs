use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use tandem_shared::types::{ConversationId, MessageId, ProfileId};

use crate::columns::{get_opt_ts, get_ts, get_uuid, to_stored_precision, ts};
use crate::error::{Result, StoreError};
use crate::models::Message;

const COLUMNS: &str = "id, conversation_id, sender_id, content, created_at, read_at, client_token";

/// Append a message.
///
/// `created_at` is the later of `now` and one microsecond past the newest
/// message in the conversation, so `(created_at, id)` order always equals
/// insertion order even when the clock stalls or steps back. Call inside a
/// write transaction.
pub fn insert(
    conn: &Connection,
    conversation_id: ConversationId,
    sender_id: ProfileId,
    content: &str,
    client_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Message> {
    let now = to_stored_precision(now);
    let created_at = match latest_created_at(conn, conversation_id)? {
        Some(last) if last >= now => last + Duration::microseconds(1),
        _ => now,
    };

    let message = Message {
        id: MessageId::new(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        created_at,
        read_at: None,
        client_token: client_token.map(str::to_string),
    };

    conn.execute(
        &format!("INSERT INTO messages ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)"),
        params![
            message.id.to_string(),
            conversation_id.to_string(),
            sender_id.to_string(),
            message.content,
            ts(created_at),
            message.client_token,
        ],
    )?;

    Ok(message)
}

pub fn latest_created_at(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<Option<DateTime<Utc>>> {
    let latest = conn
        .query_row(
            "SELECT created_at FROM messages WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![conversation_id.to_string()],
            |row| get_ts(row, 0),
        )
        .optional()?;
    Ok(latest)
}

/// A previously sent message carrying the same client idempotency token.
pub fn find_by_token(
    conn: &Connection,
    conversation_id: ConversationId,
    sender_id: ProfileId,
    client_token: &str,
) -> Result<Option<Message>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND sender_id = ?2 AND client_token = ?3"
            ),
            params![conversation_id.to_string(), sender_id.to_string(), client_token],
            row_to_message,
        )
        .optional()?;
    Ok(found)
}

pub fn get(conn: &Connection, id: MessageId) -> Result<Message> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
        params![id.to_string()],
        row_to_message,
    )
    .map_err(crate::error::not_found)
}

/// Messages in `(created_at, id)` order, starting after the message `after`.
pub fn page(
    conn: &Connection,
    conversation_id: ConversationId,
    after: Option<MessageId>,
    limit: u32,
) -> Result<Vec<Message>> {
    let mut messages = Vec::new();

    match after {
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![conversation_id.to_string(), limit], row_to_message)?;
            for row in rows {
                messages.push(row?);
            }
        }
        Some(cursor_id) => {
            let cursor = get(conn, cursor_id)?;
            if cursor.conversation_id != conversation_id {
                return Err(StoreError::NotFound);
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                   AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?4"
            ))?;
            let rows = stmt.query_map(
                params![
                    conversation_id.to_string(),
                    ts(cursor.created_at),
                    cursor.id.to_string(),
                    limit,
                ],
                row_to_message,
            )?;
            for row in rows {
                messages.push(row?);
            }
        }
    }

    Ok(messages)
}

/// Mark every unread message not sent by `reader_id` as read. Returns the
/// number of messages that changed.
pub fn mark_read(
    conn: &Connection,
    conversation_id: ConversationId,
    reader_id: ProfileId,
    now: DateTime<Utc>,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE messages SET read_at = ?1
         WHERE conversation_id = ?2 AND sender_id <> ?3 AND read_at IS NULL",
        params![ts(now), conversation_id.to_string(), reader_id.to_string()],
    )?;
    Ok(affected)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(get_uuid(row, 0)?),
        conversation_id: ConversationId(get_uuid(row, 1)?),
        sender_id: ProfileId(get_uuid(row, 2)?),
        content: row.get(3)?,
        created_at: get_ts(row, 4)?,
        read_at: get_opt_ts(row, 5)?,
        client_token: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{conversation, test_db};

    #[test]
    fn stalled_clock_still_orders_by_insertion() {
        let db = test_db();
        let (conv, a, b) = conversation(&db);
        let frozen = Utc::now();

        let first = insert(db.conn(), conv, a, "hi", None, frozen).unwrap();
        let second = insert(db.conn(), conv, b, "hey", None, frozen).unwrap();
        let third = insert(db.conn(), conv, a, "sup", None, frozen - Duration::seconds(5)).unwrap();

        assert!(first.created_at < second.created_at);
        assert!(second.created_at < third.created_at);

        let all = page(db.conn(), conv, None, 10).unwrap();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi", "hey", "sup"]);
    }

    #[test]
    fn keyset_pagination() {
        let db = test_db();
        let (conv, a, _) = conversation(&db);
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(insert(db.conn(), conv, a, &format!("m{i}"), None, Utc::now()).unwrap().id);
        }

        let first_page = page(db.conn(), conv, None, 2).unwrap();
        assert_eq!(first_page.len(), 2);
        let next = page(db.conn(), conv, Some(first_page[1].id), 10).unwrap();
        let next_ids: Vec<_> = next.iter().map(|m| m.id).collect();
        assert_eq!(next_ids, ids[2..]);

        let (other, _, _) = conversation(&db);
        assert!(matches!(page(db.conn(), other, Some(ids[0]), 10), Err(StoreError::NotFound)));
    }

    #[test]
    fn mark_read_skips_own_messages_and_is_idempotent() {
        let db = test_db();
        let (conv, a, b) = conversation(&db);
        insert(db.conn(), conv, a, "one", None, Utc::now()).unwrap();
        insert(db.conn(), conv, a, "two", None, Utc::now()).unwrap();
        insert(db.conn(), conv, b, "three", None, Utc::now()).unwrap();

        assert_eq!(mark_read(db.conn(), conv, b, Utc::now()).unwrap(), 2);
        assert_eq!(mark_read(db.conn(), conv, b, Utc::now()).unwrap(), 0);

        let all = page(db.conn(), conv, None, 10).unwrap();
        assert!(all.iter().filter(|m| m.sender_id == a).all(|m| m.read_at.is_some()));
        assert!(all.iter().filter(|m| m.sender_id == b).all(|m| m.read_at.is_none()));
    }

    #[test]
    fn client_token_is_unique_per_sender() {
        let db = test_db();
        let (conv, a, b) = conversation(&db);
        insert(db.conn(), conv, a, "hi", Some("tok-1"), Utc::now()).unwrap();

        assert!(insert(db.conn(), conv, a, "hi", Some("tok-1"), Utc::now()).is_err());
        assert!(insert(db.conn(), conv, b, "hi", Some("tok-1"), Utc::now()).is_ok());

        let found = find_by_token(db.conn(), conv, a, "tok-1").unwrap().unwrap();
        assert_eq!(found.content, "hi");
    }
}
