//! Profile moderation flags.
//!
//! The engine only reads these; they are written by the moderation side
//! (admin API) and on profile provisioning.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use tandem_shared::types::{ProfileId, ProfileStatus};

use crate::columns::{get_ts, get_uuid, ts};
use crate::error::Result;
use crate::models::ProfileRecord;

/// Create the profile or overwrite its flags.
pub fn upsert(
    conn: &Connection,
    id: ProfileId,
    status: ProfileStatus,
    now: DateTime<Utc>,
) -> Result<ProfileRecord> {
    let record = conn.query_row(
        "INSERT INTO profiles (id, active, banned, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET
             active = excluded.active,
             banned = excluded.banned,
             updated_at = excluded.updated_at
         RETURNING id, active, banned, created_at, updated_at",
        params![id.to_string(), status.active, status.banned, ts(now)],
        row_to_profile,
    )?;
    Ok(record)
}

pub fn get(conn: &Connection, id: ProfileId) -> Result<Option<ProfileRecord>> {
    let record = conn
        .query_row(
            "SELECT id, active, banned, created_at, updated_at
             FROM profiles WHERE id = ?1",
            params![id.to_string()],
            row_to_profile,
        )
        .optional()?;
    Ok(record)
}

pub fn status(conn: &Connection, id: ProfileId) -> Result<Option<ProfileStatus>> {
    Ok(get(conn, id)?.map(|p| p.status))
}

/// Returns `false` when the profile does not exist.
pub fn set_status(
    conn: &Connection,
    id: ProfileId,
    status: ProfileStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE profiles SET active = ?1, banned = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.active, status.banned, ts(now), id.to_string()],
    )?;
    Ok(affected > 0)
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRecord> {
    Ok(ProfileRecord {
        id: ProfileId(get_uuid(row, 0)?),
        status: ProfileStatus {
            active: row.get(1)?,
            banned: row.get(2)?,
        },
        created_at: get_ts(row, 3)?,
        updated_at: get_ts(row, 4)?,
    })
}
