//! Match Detector: turns a reciprocal like into exactly one match and its
//! conversation.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use tandem_shared::expiry::ExpiryPolicy;
use tandem_shared::types::{PairKey, ProfileId};
use tandem_store::{blocks, interactions, matches, profiles, Conversation, Interaction, Match, StoreError};

use super::lifecycle;

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: Match,
    pub conversation: Conversation,
    /// `false` when another swipe had already created this match.
    pub created: bool,
}

fn can_interact(conn: &Connection, profile: ProfileId) -> Result<bool, StoreError> {
    Ok(profiles::status(conn, profile)?
        .map(|s| s.can_interact())
        .unwrap_or(false))
}

/// Evaluate a freshly recorded interaction.
///
/// Creation relies on the unique `(low, high)` key: a racing duplicate
/// inserts nothing and reads back the existing row, so both sides of a
/// simultaneous mutual like see the same match. A terminated match is
/// never revived.
pub(crate) fn evaluate(
    conn: &Connection,
    interaction: &Interaction,
    expiry: ExpiryPolicy,
    now: DateTime<Utc>,
) -> Result<Option<MatchResult>, StoreError> {
    let actor = interaction.actor_id;
    let target = interaction.target_id;

    if !interaction.direction.is_like() || !interactions::likes(conn, target, actor)? {
        return Ok(None);
    }
    if !can_interact(conn, actor)? || !can_interact(conn, target)? {
        debug!(actor = %actor, target = %target, "Reciprocal like skipped, profile unavailable");
        return Ok(None);
    }
    if blocks::between(conn, actor, target)? {
        return Ok(None);
    }
    let Some(pair) = PairKey::new(actor, target) else {
        return Ok(None);
    };

    let (matched, created) = matches::insert_if_absent(conn, pair, now)?;
    if matched.is_terminated() {
        return Ok(None);
    }
    let conversation = lifecycle::get_or_create_for_match(conn, &matched, expiry, now)?;

    Ok(Some(MatchResult {
        matched,
        conversation,
        created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tandem_shared::types::{Direction, ProfileStatus};
    use tandem_store::Database;

    fn profile(db: &Database, banned: bool) -> ProfileId {
        let id = ProfileId::new();
        profiles::upsert(
            db.conn(),
            id,
            ProfileStatus { active: !banned, banned },
            Utc::now(),
        )
        .unwrap();
        id
    }

    fn swipe(db: &Database, actor: ProfileId, target: ProfileId, direction: Direction) -> Interaction {
        interactions::upsert(db.conn(), actor, target, direction, Utc::now()).unwrap()
    }

    #[test]
    fn one_sided_like_is_no_match() {
        let db = Database::open_in_memory().unwrap();
        let a = profile(&db, false);
        let b = profile(&db, false);

        let like = swipe(&db, a, b, Direction::Like);
        assert!(evaluate(db.conn(), &like, ExpiryPolicy::never(), Utc::now())
            .unwrap()
            .is_none());

        swipe(&db, b, a, Direction::Pass);
        assert!(evaluate(db.conn(), &like, ExpiryPolicy::never(), Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn reciprocal_like_creates_match_and_conversation_once() {
        let db = Database::open_in_memory().unwrap();
        let a = profile(&db, false);
        let b = profile(&db, false);
        let now = Utc::now();
        let policy = ExpiryPolicy::from_days(7);

        swipe(&db, a, b, Direction::SuperLike);
        let like = swipe(&db, b, a, Direction::Like);

        let first = evaluate(db.conn(), &like, policy, now).unwrap().unwrap();
        assert!(first.created);
        assert_eq!(first.conversation.match_id, first.matched.id);
        assert_eq!(first.conversation.expires_at, Some(first.matched.created_at + Duration::days(7)));

        let again = evaluate(db.conn(), &like, policy, now).unwrap().unwrap();
        assert!(!again.created);
        assert_eq!(again.matched.id, first.matched.id);
        assert_eq!(again.conversation.id, first.conversation.id);
    }

    #[test]
    fn banned_or_terminated_pairs_do_not_match() {
        let db = Database::open_in_memory().unwrap();
        let a = profile(&db, false);
        let banned = profile(&db, true);
        swipe(&db, banned, a, Direction::Like);
        let like = swipe(&db, a, banned, Direction::Like);
        assert!(evaluate(db.conn(), &like, ExpiryPolicy::never(), Utc::now())
            .unwrap()
            .is_none());

        let b = profile(&db, false);
        swipe(&db, b, a, Direction::Like);
        let like = swipe(&db, a, b, Direction::Like);
        let result = evaluate(db.conn(), &like, ExpiryPolicy::never(), Utc::now())
            .unwrap()
            .unwrap();
        matches::terminate(db.conn(), result.matched.id, Some(a), Utc::now()).unwrap();
        assert!(evaluate(db.conn(), &like, ExpiryPolicy::never(), Utc::now())
            .unwrap()
            .is_none());
    }
}
