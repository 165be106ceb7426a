//! Interaction Ledger: records swipes and drives quota and match detection.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use tandem_shared::expiry::ExpiryPolicy;
use tandem_shared::types::{Direction, MatchId, PairKey, ProfileId};
use tandem_store::{blocks, conversations, interactions, matches, Conversation};

use super::quota::{self, QuotaDecision};
use super::{matcher, Engine};
use crate::error::ServerError;

#[derive(Debug, Clone, Serialize)]
pub struct SwipeOutcome {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
    /// Absent for premium profiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_swipes: Option<u32>,
    /// This swipe created the match.
    #[serde(skip)]
    pub new_match: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SwipeInput {
    pub actor: ProfileId,
    pub target: ProfileId,
    pub direction: Direction,
    pub premium: bool,
    pub daily_limit: u32,
    pub expiry: ExpiryPolicy,
}

/// Record one swipe. Must run inside a write transaction: on `Err` nothing
/// (quota included) is kept.
pub(crate) fn record(
    conn: &Connection,
    input: &SwipeInput,
    now: DateTime<Utc>,
) -> Result<SwipeOutcome, ServerError> {
    let SwipeInput {
        actor,
        target,
        direction,
        premium,
        daily_limit,
        expiry,
    } = *input;

    let pair = PairKey::new(actor, target)
        .ok_or_else(|| ServerError::InvalidOperation("cannot swipe on yourself".into()))?;

    if blocks::between(conn, actor, target)? {
        return Err(ServerError::Conflict("this pair is blocked".into()));
    }

    if let Some(existing) = matches::find_by_pair(conn, pair)? {
        if existing.is_terminated() {
            return Err(ServerError::Conflict("the match for this pair has ended".into()));
        }
        if !direction.is_like() {
            return Err(ServerError::Conflict("cannot pass on an existing match".into()));
        }
        return Ok(SwipeOutcome {
            matched: true,
            match_id: Some(existing.id),
            conversation: conversations::for_match(conn, existing.id)?,
            remaining_swipes: quota::remaining(conn, actor, premium, daily_limit, now)?,
            new_match: false,
        });
    }

    if let Some(prior) = interactions::get(conn, actor, target)? {
        if prior.direction == direction {
            return Ok(SwipeOutcome {
                matched: false,
                match_id: None,
                conversation: None,
                remaining_swipes: quota::remaining(conn, actor, premium, daily_limit, now)?,
                new_match: false,
            });
        }
    }

    let remaining_swipes =
        match quota::check_and_increment(conn, actor, premium, daily_limit, now)? {
            QuotaDecision::Allowed { remaining } => remaining,
            QuotaDecision::LimitReached => {
                return Err(ServerError::LimitReached { limit: daily_limit })
            }
        };

    let interaction = interactions::upsert(conn, actor, target, direction, now)?;

    Ok(match matcher::evaluate(conn, &interaction, expiry, now)? {
        Some(result) => SwipeOutcome {
            matched: true,
            match_id: Some(result.matched.id),
            conversation: Some(result.conversation),
            remaining_swipes,
            new_match: result.created,
        },
        None => SwipeOutcome {
            matched: false,
            match_id: None,
            conversation: None,
            remaining_swipes,
            new_match: false,
        },
    })
}

impl Engine {
    /// Swipe `direction` on `target` as `actor`.
    pub async fn swipe(
        &self,
        actor: ProfileId,
        target: ProfileId,
        direction: Direction,
    ) -> Result<SwipeOutcome, ServerError> {
        if actor == target {
            return Err(ServerError::InvalidOperation("cannot swipe on yourself".into()));
        }
        match self.profiles.status(actor).await? {
            Some(status) if status.can_interact() => {}
            _ => return Err(ServerError::Forbidden("profile cannot swipe".into())),
        }
        match self.profiles.status(target).await? {
            Some(status) if status.can_interact() => {}
            _ => return Err(ServerError::NotFound("profile".into())),
        }

        let input = SwipeInput {
            actor,
            target,
            direction,
            premium: self.entitlement.is_premium(actor).await,
            daily_limit: self.settings.daily_limit,
            expiry: self.settings.expiry,
        };
        let now = self.clock.now();

        let outcome = self
            .store
            .run_idempotent(move |db| db.write(|conn| record(conn, &input, now)))
            .await;

        match &outcome {
            Ok(o) if o.new_match => {
                info!(
                    actor = %actor,
                    target = %target,
                    match_id = ?o.match_id,
                    "Match created"
                );
            }
            Ok(_) => debug!(actor = %actor, target = %target, %direction, "Swipe recorded"),
            Err(e) => debug!(actor = %actor, target = %target, error = %e, "Swipe rejected"),
        }
        outcome
    }
}
