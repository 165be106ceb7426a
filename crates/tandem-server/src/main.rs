//! # tandem-server
//!
//! Swipe, match and conversation engine for the Tandem dating app.
//!
//! This binary provides:
//! - **Swipes** with a free-tier daily quota and a premium override
//! - **Match detection** that creates exactly one match and conversation per
//!   mutual like, even under concurrent opposing swipes
//! - **Messaging** with ordered history, read receipts and typing signals
//! - **Live channels** over WebSocket, one per conversation
//! - **REST API** (axum) for clients, plus an admin surface for moderation
//!   and premium grants

mod api;
mod auth;
mod clock;
mod config;
mod db;
mod engine;
mod error;
mod hub;
mod moderation;
mod premium;
mod ws;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;
use tracing_subscriber::EnvFilter;

use tandem_shared::constants::SUBSCRIBER_BUFFER;

use crate::api::AppState;
use crate::clock::SystemClock;
use crate::config::ServerConfig;
use crate::db::StoreHandle;
use crate::engine::{Engine, EngineSettings};
use crate::hub::ConversationHub;
use crate::moderation::StoreProfileStatus;
use crate::premium::PremiumVerifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tandem_server=debug,tandem_store=debug")),
        )
        .init();

    info!("Starting Tandem server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        admin_enabled = config.admin_token.is_some(),
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = StoreHandle::open(
        &config.database_path,
        config.db_pool_size,
        Duration::from_millis(config.db_checkout_timeout_ms),
    )?;
    let settings = EngineSettings::from_config(&config);
    let premium_verifier = Arc::new(PremiumVerifier::new(config.entitlement_pubkey));
    let hub = ConversationHub::new(settings.typing_ttl, SUBSCRIBER_BUFFER);

    let engine = Arc::new(Engine::new(
        store.clone(),
        hub,
        premium_verifier.clone(),
        Arc::new(StoreProfileStatus::new(store)),
        Arc::new(SystemClock),
        settings,
    ));

    let app_state = AppState {
        engine: engine.clone(),
        premium_verifier: premium_verifier.clone(),
        config: Arc::new(config.clone()),
        started_at: Instant::now(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic premium cache cleanup (every 10 minutes)
    let pv = premium_verifier.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            pv.purge_expired().await;
        }
    });

    // Hub maintenance: stale typing windows, idle sequencers (every minute)
    let maintained = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            maintained.hub().maintain(maintained.clock().now());
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
