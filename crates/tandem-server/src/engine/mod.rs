//! The swipe, match and conversation engine.
//!
//! Each component lives in its own module as a set of transaction-scoped
//! functions over `&Connection` plus the async [`Engine`] methods that call
//! them. A swipe runs ledger, quota, match detection and conversation
//! creation inside one `BEGIN IMMEDIATE` transaction, so readers never see a
//! match without its conversation and the quota cannot be overrun.

pub mod ledger;
pub mod lifecycle;
pub mod matcher;
pub mod messaging;
pub mod quota;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use chrono::Duration;

use tandem_shared::constants::TYPING_TTL_MS;
use tandem_shared::expiry::ExpiryPolicy;

use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::db::StoreHandle;
use crate::hub::ConversationHub;
use crate::moderation::ProfileStatusSource;
use crate::premium::Entitlement;

/// Tunables derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub daily_limit: u32,
    pub expiry: ExpiryPolicy,
    pub typing_ttl: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            daily_limit: config.daily_swipe_limit,
            expiry: ExpiryPolicy::from_days(config.conversation_ttl_days),
            typing_ttl: typing_ttl(config.typing_ttl_ms),
        }
    }
}

fn typing_ttl(ms: u64) -> Duration {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or_else(|| Duration::milliseconds(TYPING_TTL_MS as i64))
}

pub struct Engine {
    store: StoreHandle,
    hub: ConversationHub,
    entitlement: Arc<dyn Entitlement>,
    profiles: Arc<dyn ProfileStatusSource>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: StoreHandle,
        hub: ConversationHub,
        entitlement: Arc<dyn Entitlement>,
        profiles: Arc<dyn ProfileStatusSource>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            hub,
            entitlement,
            profiles,
            clock,
            settings,
        }
    }

    pub fn hub(&self) -> &ConversationHub {
        &self.hub
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
