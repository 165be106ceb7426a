//! Conversation Lifecycle: creation at match time, activity, expiry and
//! termination (unmatch, block, moderation).

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use tandem_shared::constants::MESSAGE_PREVIEW_CHARS;
use tandem_shared::expiry::ExpiryPolicy;
use tandem_shared::protocol::CloseReason;
use tandem_shared::types::{ConversationId, MatchId, PairKey, ProfileId, ProfileStatus};
use tandem_store::{
    blocks, conversations, matches, profiles, Conversation, Match, ProfileRecord, StoreError,
};

use super::Engine;
use crate::error::ServerError;

/// `Active → Expired`, and `Active | Expired → Terminated` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Active,
    Expired,
    Terminated,
}

pub fn state(matched: &Match, conversation: &Conversation, now: DateTime<Utc>) -> ConversationState {
    if matched.is_terminated() {
        ConversationState::Terminated
    } else if conversation.is_expired(now) {
        ConversationState::Expired
    } else {
        ConversationState::Active
    }
}

/// The conversation of `matched`, created on first call.
///
/// Only match detection calls this; the deadline runs from match creation.
pub(crate) fn get_or_create_for_match(
    conn: &Connection,
    matched: &Match,
    policy: ExpiryPolicy,
    now: DateTime<Utc>,
) -> Result<Conversation, StoreError> {
    let expires_at = policy.expires_at(matched.created_at);
    let (conversation, created) =
        conversations::insert_if_absent(conn, matched.id, expires_at, now)?;
    if created {
        debug!(conversation = %conversation.id, match_id = %matched.id, "Created conversation");
    }
    Ok(conversation)
}

pub(crate) fn preview(content: &str) -> String {
    content.chars().take(MESSAGE_PREVIEW_CHARS).collect()
}

pub(crate) fn record_activity(
    conn: &Connection,
    conversation_id: ConversationId,
    content: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conversations::record_activity(conn, conversation_id, &preview(content), at)
}

/// Soft-terminate a match. `by` is `None` for moderation.
pub(crate) fn terminate(
    conn: &Connection,
    match_id: MatchId,
    by: Option<ProfileId>,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    matches::terminate(conn, match_id, by, now)
}

/// Load a conversation with its match, checking `actor` takes part in it.
pub(crate) fn authorize(
    conn: &Connection,
    conversation_id: ConversationId,
    actor: ProfileId,
) -> Result<(Conversation, Match), ServerError> {
    let conversation = conversations::get(conn, conversation_id)?
        .ok_or_else(|| ServerError::NotFound("conversation".into()))?;
    let matched = matches::get(conn, conversation.match_id)?
        .ok_or_else(|| ServerError::NotFound("match".into()))?;
    if !matched.is_participant(actor) {
        return Err(ServerError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }
    Ok((conversation, matched))
}

/// Write a profile's flags; a ban also ends every active match it is in.
/// Returns the conversations that were closed.
fn apply_status(
    conn: &Connection,
    profile: ProfileId,
    status: ProfileStatus,
    now: DateTime<Utc>,
) -> Result<(ProfileRecord, Vec<ConversationId>), StoreError> {
    let record = profiles::upsert(conn, profile, status, now)?;
    let mut closed = Vec::new();
    if status.banned {
        for matched in matches::active_for_profile(conn, profile)? {
            if terminate(conn, matched.id, None, now)? {
                if let Some(conversation) = conversations::for_match(conn, matched.id)? {
                    closed.push(conversation.id);
                }
            }
        }
    }
    Ok((record, closed))
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub counterpart_id: ProfileId,
    pub matched_at: DateTime<Utc>,
    pub conversation_id: Option<ConversationId>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart_id: ProfileId,
    pub state: ConversationState,
}

impl Engine {
    /// Create or update a profile's moderation flags (admin provisioning).
    pub async fn provision_profile(
        &self,
        profile: ProfileId,
        status: ProfileStatus,
    ) -> Result<ProfileRecord, ServerError> {
        let now = self.clock.now();
        let (record, closed) = self
            .store
            .run_idempotent(move |db| db.write(|conn| Ok(apply_status(conn, profile, status, now)?)))
            .await?;
        for conversation_id in closed {
            self.close_live(conversation_id, CloseReason::Moderation).await;
        }
        Ok(record)
    }

    /// Ban a known profile: deactivate it and end all of its active matches.
    pub async fn ban(&self, profile: ProfileId) -> Result<usize, ServerError> {
        let now = self.clock.now();
        let closed = self
            .store
            .run_idempotent(move |db| {
                db.write(|conn| {
                    if profiles::get(conn, profile)?.is_none() {
                        return Err(ServerError::NotFound("profile".into()));
                    }
                    let banned = ProfileStatus { active: false, banned: true };
                    Ok(apply_status(conn, profile, banned, now)?.1)
                })
            })
            .await?;

        info!(profile = %profile, matches_closed = closed.len(), "Profile banned");
        let count = closed.len();
        for conversation_id in closed {
            self.close_live(conversation_id, CloseReason::Moderation).await;
        }
        Ok(count)
    }

    /// Lift a ban. Matches ended by the ban stay ended.
    pub async fn unban(&self, profile: ProfileId) -> Result<(), ServerError> {
        let now = self.clock.now();
        let restored = ProfileStatus { active: true, banned: false };
        let updated = self
            .store
            .run_idempotent(move |db| Ok(profiles::set_status(db.conn(), profile, restored, now)?))
            .await?;
        if !updated {
            return Err(ServerError::NotFound("profile".into()));
        }
        info!(profile = %profile, "Profile unbanned");
        Ok(())
    }

    /// End a match on behalf of one of its participants. Repeating it is a
    /// no-op success.
    pub async fn unmatch(&self, actor: ProfileId, match_id: MatchId) -> Result<(), ServerError> {
        let now = self.clock.now();
        let (terminated, conversation_id) = self
            .store
            .run_idempotent(move |db| {
                db.write(|conn| {
                    let matched = matches::get(conn, match_id)?
                        .filter(|m| m.is_participant(actor))
                        .ok_or_else(|| {
                            ServerError::Forbidden("not a participant of this match".into())
                        })?;
                    let terminated = terminate(conn, matched.id, Some(actor), now)?;
                    let conversation = conversations::for_match(conn, matched.id)?;
                    Ok((terminated, conversation.map(|c| c.id)))
                })
            })
            .await?;

        if terminated {
            info!(match_id = %match_id, by = %actor, "Match ended by participant");
            if let Some(conversation_id) = conversation_id {
                self.close_live(conversation_id, CloseReason::Unmatched).await;
            }
        }
        Ok(())
    }

    /// Block `target`. Ends the pair's active match, if any, and closes the
    /// pair to future swipes in both directions.
    pub async fn block(&self, actor: ProfileId, target: ProfileId) -> Result<(), ServerError> {
        let pair = PairKey::new(actor, target)
            .ok_or_else(|| ServerError::InvalidOperation("cannot block yourself".into()))?;
        let now = self.clock.now();

        let closed = self
            .store
            .run_idempotent(move |db| {
                db.write(|conn| {
                    if profiles::get(conn, target)?.is_none() {
                        return Err(ServerError::NotFound("profile".into()));
                    }
                    if !blocks::insert(conn, actor, target, now)? {
                        return Ok(None);
                    }
                    let Some(matched) = matches::find_by_pair(conn, pair)? else {
                        return Ok(None);
                    };
                    if !terminate(conn, matched.id, Some(actor), now)? {
                        return Ok(None);
                    }
                    Ok(conversations::for_match(conn, matched.id)?.map(|c| c.id))
                })
            })
            .await?;

        debug!(blocker = %actor, blocked = %target, "Profile blocked");
        if let Some(conversation_id) = closed {
            self.close_live(conversation_id, CloseReason::Blocked).await;
        }
        Ok(())
    }

    /// Active matches of `profile`, newest first.
    pub async fn list_matches(&self, profile: ProfileId) -> Result<Vec<MatchSummary>, ServerError> {
        let now = self.clock.now();
        self.store
            .run(move |db| {
                let conn = db.conn();
                let mut summaries = Vec::new();
                for matched in matches::active_for_profile(conn, profile)? {
                    let Some(counterpart_id) = matched.counterpart(profile) else {
                        continue;
                    };
                    let conversation = conversations::for_match(conn, matched.id)?;
                    summaries.push(MatchSummary {
                        match_id: matched.id,
                        counterpart_id,
                        matched_at: matched.created_at,
                        conversation_id: conversation.as_ref().map(|c| c.id),
                        last_message_at: conversation.as_ref().and_then(|c| c.last_message_at),
                        last_message_preview: conversation
                            .as_ref()
                            .and_then(|c| c.last_message_preview.clone()),
                        expired: conversation.as_ref().is_some_and(|c| c.is_expired(now)),
                    });
                }
                Ok(summaries)
            })
            .await
    }

    pub async fn conversation(
        &self,
        actor: ProfileId,
        conversation_id: ConversationId,
    ) -> Result<ConversationDetail, ServerError> {
        let now = self.clock.now();
        self.store
            .run(move |db| {
                let (conversation, matched) = authorize(db.conn(), conversation_id, actor)?;
                let counterpart_id = matched
                    .counterpart(actor)
                    .ok_or_else(|| ServerError::Forbidden("not a participant".into()))?;
                let state = state(&matched, &conversation, now);
                Ok(ConversationDetail {
                    conversation,
                    counterpart_id,
                    state,
                })
            })
            .await
    }

    /// Close the live room after the termination has committed. Taking the
    /// conversation's sequencer orders this after any in-flight send or
    /// subscribe.
    pub(crate) async fn close_live(&self, conversation_id: ConversationId, reason: CloseReason) {
        let sequencer = self.hub.sequencer(conversation_id);
        let _turn = sequencer.lock().await;
        self.hub.close_room(conversation_id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{matched_pair, profile, test_engine};
    use chrono::Duration;
    use tandem_shared::protocol::ServerEvent;

    #[test]
    fn state_machine() {
        let now = Utc::now();
        let mut matched = Match {
            id: MatchId::new(),
            profile_low_id: ProfileId::new(),
            profile_high_id: ProfileId::new(),
            created_at: now,
            unmatched_at: None,
            unmatched_by: None,
        };
        let mut conversation = Conversation {
            id: ConversationId::new(),
            match_id: matched.id,
            created_at: now,
            last_message_at: None,
            last_message_preview: None,
            expires_at: Some(now + Duration::days(7)),
            expired: false,
        };

        assert_eq!(state(&matched, &conversation, now), ConversationState::Active);
        assert_eq!(
            state(&matched, &conversation, now + Duration::days(7)),
            ConversationState::Expired
        );
        conversation.last_message_at = Some(now);
        assert_eq!(
            state(&matched, &conversation, now + Duration::days(7)),
            ConversationState::Active
        );
        matched.unmatched_at = Some(now);
        assert_eq!(state(&matched, &conversation, now), ConversationState::Terminated);
    }

    #[test]
    fn preview_counts_characters() {
        let long = "é".repeat(150);
        assert_eq!(preview(&long).chars().count(), MESSAGE_PREVIEW_CHARS);
        assert_eq!(preview("hi"), "hi");
    }

    #[tokio::test]
    async fn unmatch_is_idempotent_for_participants_only() {
        let t = test_engine();
        let (a, b, _) = matched_pair(&t).await;
        let matches = t.engine.list_matches(a).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].counterpart_id, b);
        let match_id = matches[0].match_id;

        let outsider = profile(&t).await;
        assert!(matches!(
            t.engine.unmatch(outsider, match_id).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            t.engine.unmatch(a, MatchId::new()).await,
            Err(ServerError::Forbidden(_))
        ));

        t.engine.unmatch(a, match_id).await.unwrap();
        t.engine.unmatch(b, match_id).await.unwrap();
        assert!(t.engine.list_matches(a).await.unwrap().is_empty());
        assert!(t.engine.list_matches(b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatch_closes_live_subscribers() {
        let t = test_engine();
        let (a, b, conversation_id) = matched_pair(&t).await;
        let mut live = t.engine.subscribe(b, conversation_id).await.unwrap();
        let match_id = t.engine.list_matches(a).await.unwrap()[0].match_id;

        t.engine.unmatch(a, match_id).await.unwrap();

        assert!(matches!(
            live.recv().await,
            Some(ServerEvent::ConversationClosed { reason: CloseReason::Unmatched, .. })
        ));
        assert!(live.recv().await.is_none());
        let detail = t.engine.conversation(b, conversation_id).await.unwrap();
        assert_eq!(detail.state, ConversationState::Terminated);
    }

    #[tokio::test]
    async fn block_ends_match_and_rejects_self() {
        let t = test_engine();
        let (a, b, conversation_id) = matched_pair(&t).await;

        assert!(matches!(
            t.engine.block(a, a).await,
            Err(ServerError::InvalidOperation(_))
        ));
        assert!(matches!(
            t.engine.block(a, ProfileId::new()).await,
            Err(ServerError::NotFound(_))
        ));

        t.engine.block(b, a).await.unwrap();
        t.engine.block(b, a).await.unwrap();

        let detail = t.engine.conversation(a, conversation_id).await.unwrap();
        assert_eq!(detail.state, ConversationState::Terminated);
        assert!(t.engine.list_matches(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ban_terminates_matches_and_unban_keeps_them_ended() {
        let t = test_engine();
        let (a, b, conversation_id) = matched_pair(&t).await;
        let mut live = t.engine.subscribe(a, conversation_id).await.unwrap();

        assert_eq!(t.engine.ban(b).await.unwrap(), 1);
        assert!(matches!(
            live.recv().await,
            Some(ServerEvent::ConversationClosed { reason: CloseReason::Moderation, .. })
        ));

        t.engine.unban(b).await.unwrap();
        assert!(t.engine.list_matches(a).await.unwrap().is_empty());
        assert!(matches!(
            t.engine.unban(ProfileId::new()).await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            t.engine.ban(ProfileId::new()).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn match_listing_reports_expiry() {
        let t = test_engine();
        let (a, _, conversation_id) = matched_pair(&t).await;

        let listed = t.engine.list_matches(a).await.unwrap();
        assert_eq!(listed[0].conversation_id, Some(conversation_id));
        assert!(!listed[0].expired);

        t.clock.advance(Duration::days(8));
        assert!(t.engine.list_matches(a).await.unwrap()[0].expired);
        let detail = t.engine.conversation(a, conversation_id).await.unwrap();
        assert_eq!(detail.state, ConversationState::Expired);
    }
}
