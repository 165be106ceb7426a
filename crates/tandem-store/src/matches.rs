//! Match rows, keyed by the canonical `(low, high)` profile pair.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use tandem_shared::types::{MatchId, PairKey, ProfileId};

use crate::columns::{get_opt_ts, get_opt_uuid, get_ts, get_uuid, ts};
use crate::error::Result;
use crate::models::Match;

const COLUMNS: &str =
    "id, profile_low_id, profile_high_id, created_at, unmatched_at, unmatched_by";

pub fn get(conn: &Connection, id: MatchId) -> Result<Option<Match>> {
    let found = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM matches WHERE id = ?1"),
            params![id.to_string()],
            row_to_match,
        )
        .optional()?;
    Ok(found)
}

/// The match for a pair, active or terminated.
pub fn find_by_pair(conn: &Connection, pair: PairKey) -> Result<Option<Match>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM matches
                 WHERE profile_low_id = ?1 AND profile_high_id = ?2"
            ),
            params![pair.low().to_string(), pair.high().to_string()],
            row_to_match,
        )
        .optional()?;
    Ok(found)
}

/// Create the match for `pair` unless one already exists.
///
/// Returns the row for the pair and whether this call created it. A racing
/// second writer hits the unique constraint, inserts nothing, and reads back
/// the winner's row.
pub fn insert_if_absent(
    conn: &Connection,
    pair: PairKey,
    now: DateTime<Utc>,
) -> Result<(Match, bool)> {
    let inserted = conn.execute(
        "INSERT INTO matches (id, profile_low_id, profile_high_id, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(profile_low_id, profile_high_id) DO NOTHING",
        params![
            MatchId::new().to_string(),
            pair.low().to_string(),
            pair.high().to_string(),
            ts(now),
        ],
    )?;

    let row = find_by_pair(conn, pair)?.ok_or(crate::StoreError::NotFound)?;
    Ok((row, inserted == 1))
}

/// Soft-terminate an active match. Returns `false` if it was already
/// terminated or does not exist.
pub fn terminate(
    conn: &Connection,
    id: MatchId,
    by: Option<ProfileId>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE matches SET unmatched_at = ?1, unmatched_by = ?2
         WHERE id = ?3 AND unmatched_at IS NULL",
        params![ts(now), by.map(|p| p.to_string()), id.to_string()],
    )?;
    Ok(affected > 0)
}

/// Active matches involving `profile`, newest first.
pub fn active_for_profile(conn: &Connection, profile: ProfileId) -> Result<Vec<Match>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM matches
         WHERE (profile_low_id = ?1 OR profile_high_id = ?1) AND unmatched_at IS NULL
         ORDER BY created_at DESC, id DESC"
    ))?;

    let rows = stmt.query_map(params![profile.to_string()], row_to_match)?;

    let mut found = Vec::new();
    for row in rows {
        found.push(row?);
    }
    Ok(found)
}

fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: MatchId(get_uuid(row, 0)?),
        profile_low_id: ProfileId(get_uuid(row, 1)?),
        profile_high_id: ProfileId(get_uuid(row, 2)?),
        created_at: get_ts(row, 3)?,
        unmatched_at: get_opt_ts(row, 4)?,
        unmatched_by: get_opt_uuid(row, 5)?.map(ProfileId),
    })
}
