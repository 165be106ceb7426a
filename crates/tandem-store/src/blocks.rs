use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use tandem_shared::types::ProfileId;

use crate::columns::ts;
use crate::error::Result;

/// Record a block. Returns `false` if it already existed.
pub fn insert(
    conn: &Connection,
    blocker: ProfileId,
    blocked: ProfileId,
    now: DateTime<Utc>,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
        params![blocker.to_string(), blocked.to_string(), ts(now)],
    )?;
    Ok(inserted == 1)
}

/// Whether either profile has blocked the other.
pub fn between(conn: &Connection, a: ProfileId, b: ProfileId) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM blocks
             WHERE (blocker_id = ?1 AND blocked_id = ?2)
                OR (blocker_id = ?2 AND blocked_id = ?1)
         )",
        params![a.to_string(), b.to_string()],
        |row| row.get(0),
    )?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn block_is_symmetric_for_lookups() {
        let db = Database::open_in_memory().unwrap();
        let a = ProfileId::new();
        let b = ProfileId::new();

        assert!(!between(db.conn(), a, b).unwrap());
        assert!(insert(db.conn(), a, b, Utc::now()).unwrap());
        assert!(!insert(db.conn(), a, b, Utc::now()).unwrap());
        assert!(between(db.conn(), b, a).unwrap());
        assert!(!between(db.conn(), a, ProfileId::new()).unwrap());
    }
}
