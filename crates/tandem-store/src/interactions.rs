//! The interaction ledger: one row per ordered `(actor, target)` pair.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use tandem_shared::types::{Direction, ProfileId};

use crate::columns::{get_ts, get_uuid, ts};
use crate::error::Result;
use crate::models::Interaction;

const COLUMNS: &str = "actor_id, target_id, direction, created_at, updated_at";

pub fn get(conn: &Connection, actor: ProfileId, target: ProfileId) -> Result<Option<Interaction>> {
    let interaction = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM interactions WHERE actor_id = ?1 AND target_id = ?2"),
            params![actor.to_string(), target.to_string()],
            row_to_interaction,
        )
        .optional()?;
    Ok(interaction)
}

/// Insert the swipe, or overwrite the direction of an earlier one.
pub fn upsert(
    conn: &Connection,
    actor: ProfileId,
    target: ProfileId,
    direction: Direction,
    now: DateTime<Utc>,
) -> Result<Interaction> {
    let interaction = conn.query_row(
        &format!(
            "INSERT INTO interactions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(actor_id, target_id) DO UPDATE SET
                 direction = excluded.direction,
                 updated_at = excluded.updated_at
             RETURNING {COLUMNS}"
        ),
        params![actor.to_string(), target.to_string(), direction.as_str(), ts(now)],
        row_to_interaction,
    )?;
    Ok(interaction)
}

/// Whether `actor` has a like-class interaction towards `target`.
pub fn likes(conn: &Connection, actor: ProfileId, target: ProfileId) -> Result<bool> {
    Ok(get(conn, actor, target)?
        .map(|i| i.direction.is_like())
        .unwrap_or(false))
}

fn row_to_interaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Interaction> {
    let raw_direction: String = row.get(2)?;
    let direction = raw_direction.parse::<Direction>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
    })?;

    Ok(Interaction {
        actor_id: ProfileId(get_uuid(row, 0)?),
        target_id: ProfileId(get_uuid(row, 1)?),
        direction,
        created_at: get_ts(row, 3)?,
        updated_at: get_ts(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{profile, test_db};
    use chrono::Duration;

    #[test]
    fn repeat_swipe_overwrites_instead_of_duplicating() {
        let db = test_db();
        let a = profile(&db);
        let b = profile(&db);
        let first = Utc::now();

        let pass = upsert(db.conn(), a, b, Direction::Pass, first).unwrap();
        assert_eq!(pass.direction, Direction::Pass);

        let later = first + Duration::minutes(5);
        let like = upsert(db.conn(), a, b, Direction::Like, later).unwrap();
        assert_eq!(like.direction, Direction::Like);
        assert_eq!(like.created_at, pass.created_at);
        assert!(like.updated_at > like.created_at);

        let rows: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM interactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert!(likes(db.conn(), a, b).unwrap());
        assert!(!likes(db.conn(), b, a).unwrap());
    }

    #[test]
    fn self_swipe_violates_schema() {
        let db = test_db();
        let a = profile(&db);
        assert!(upsert(db.conn(), a, a, Direction::Like, Utc::now()).is_err());
    }
}
