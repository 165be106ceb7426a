//! Per-profile, per-UTC-day interaction counters.
//!
//! A new day has no row yet, so counters reset by key rollover. The only
//! write is a single conditional upsert, which makes the increment atomic
//! with respect to concurrent writers on any connection.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use tandem_shared::types::ProfileId;

use crate::error::Result;

/// `YYYY-MM-DD` of `now` in UTC.
pub fn day_key(now: DateTime<Utc>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

/// Today's count; zero when no row exists yet.
pub fn count(conn: &Connection, profile: ProfileId, day_key: &str) -> Result<u32> {
    let count: Option<u32> = conn
        .query_row(
            "SELECT count FROM quota_records WHERE profile_id = ?1 AND day_key = ?2",
            params![profile.to_string(), day_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0))
}

/// Increment the counter unless it already reached `limit`.
///
/// Returns the new count, or `None` when the limit was reached (no write).
pub fn increment_below(
    conn: &Connection,
    profile: ProfileId,
    day_key: &str,
    limit: u32,
) -> Result<Option<u32>> {
    if limit == 0 {
        return Ok(None);
    }

    let new_count: Option<u32> = conn
        .query_row(
            "INSERT INTO quota_records (profile_id, day_key, count) VALUES (?1, ?2, 1)
             ON CONFLICT(profile_id, day_key) DO UPDATE SET count = count + 1
                 WHERE count < ?3
             RETURNING count",
            params![profile.to_string(), day_key, limit],
            |row| row.get(0),
        )
        .optional()?;
    Ok(new_count)
}
