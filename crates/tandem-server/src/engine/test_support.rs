//! Engine fixtures: a file-backed store pool, a manual clock and a local
//! premium verifier.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use tandem_shared::constants::SUBSCRIBER_BUFFER;
use tandem_shared::types::{ConversationId, Direction, ProfileId, ProfileStatus};

use super::{Engine, EngineSettings};
use crate::clock::ManualClock;
use crate::config::ServerConfig;
use crate::db::test_store;
use crate::hub::ConversationHub;
use crate::moderation::StoreProfileStatus;
use crate::premium::PremiumVerifier;

pub(crate) struct TestEngine {
    pub engine: Arc<Engine>,
    pub clock: Arc<ManualClock>,
    pub premium: Arc<PremiumVerifier>,
    _dir: TempDir,
}

pub(crate) fn test_engine() -> TestEngine {
    test_engine_with(|_| {})
}

pub(crate) fn test_engine_with(tweak: impl FnOnce(&mut EngineSettings)) -> TestEngine {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = test_store(&dir, 4);

    let mut settings = EngineSettings::from_config(&ServerConfig::default());
    tweak(&mut settings);

    // Midday, so a few hours of advancing never crosses a UTC day.
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
    ));
    let premium = Arc::new(PremiumVerifier::new([0u8; 32]));
    let engine = Engine::new(
        store.clone(),
        ConversationHub::new(settings.typing_ttl, SUBSCRIBER_BUFFER),
        premium.clone(),
        Arc::new(StoreProfileStatus::new(store.clone())),
        clock.clone(),
        settings,
    );

    TestEngine {
        engine: Arc::new(engine),
        clock,
        premium,
        _dir: dir,
    }
}

/// A fresh active profile.
pub(crate) async fn profile(t: &TestEngine) -> ProfileId {
    let id = ProfileId::new();
    t.engine
        .provision_profile(id, ProfileStatus { active: true, banned: false })
        .await
        .expect("provision profile");
    id
}

/// Two matched profiles and their conversation.
pub(crate) async fn matched_pair(t: &TestEngine) -> (ProfileId, ProfileId, ConversationId) {
    let a = profile(t).await;
    let b = profile(t).await;
    t.engine.swipe(a, b, Direction::Like).await.expect("first like");
    let outcome = t.engine.swipe(b, a, Direction::Like).await.expect("second like");
    let conversation = outcome.conversation.expect("match opens a conversation");
    (a, b, conversation.id)
}
