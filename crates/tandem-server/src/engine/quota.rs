//! Quota Tracker: the free-tier daily swipe cap.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use tandem_shared::types::ProfileId;
use tandem_store::{quota, StoreError};

use super::Engine;
use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// `remaining` is `None` for premium profiles.
    Allowed { remaining: Option<u32> },
    LimitReached,
}

/// Admit one swipe for `profile` today, consuming quota unless premium.
///
/// The increment is a single conditional upsert, so concurrent callers at
/// the boundary cannot both be admitted.
pub(crate) fn check_and_increment(
    conn: &Connection,
    profile: ProfileId,
    premium: bool,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<QuotaDecision, StoreError> {
    if premium {
        return Ok(QuotaDecision::Allowed { remaining: None });
    }
    match quota::increment_below(conn, profile, &quota::day_key(now), limit)? {
        Some(count) => Ok(QuotaDecision::Allowed {
            remaining: Some(limit.saturating_sub(count)),
        }),
        None => Ok(QuotaDecision::LimitReached),
    }
}

/// Swipes left today without consuming any.
pub(crate) fn remaining(
    conn: &Connection,
    profile: ProfileId,
    premium: bool,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<Option<u32>, StoreError> {
    if premium {
        return Ok(None);
    }
    let used = quota::count(conn, profile, &quota::day_key(now))?;
    Ok(Some(limit.saturating_sub(used)))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: u32,
    pub used: u32,
    pub remaining: Option<u32>,
    pub premium: bool,
}

impl Engine {
    pub async fn quota_status(&self, profile: ProfileId) -> Result<QuotaStatus, ServerError> {
        let premium = self.entitlement.is_premium(profile).await;
        let limit = self.settings.daily_limit;
        let day_key = quota::day_key(self.clock.now());

        let used = self
            .store
            .run(move |db| Ok(quota::count(db.conn(), profile, &day_key)?))
            .await?;

        Ok(QuotaStatus {
            limit,
            used,
            remaining: (!premium).then(|| limit.saturating_sub(used)),
            premium,
        })
    }
}
