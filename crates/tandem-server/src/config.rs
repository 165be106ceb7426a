//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use tandem_shared::constants::{
    APP_NAME, DAILY_SWIPE_LIMIT, DEFAULT_CONVERSATION_TTL_DAYS, DEFAULT_HTTP_PORT,
    MAX_CONVERSATION_TTL_DAYS, MAX_TYPING_TTL_MS, TYPING_TTL_MS,
};

/// Longest a request waits for a pooled connection, in milliseconds.
const MAX_DB_CHECKOUT_TIMEOUT_MS: u64 = 60_000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./tandem.db`
    pub database_path: PathBuf,

    /// Number of pooled SQLite connections.
    /// Env: `DB_POOL_SIZE`
    /// Default: `4`
    pub db_pool_size: u32,

    /// How long a request waits for a free pooled connection.
    /// Env: `DB_CHECKOUT_TIMEOUT_MS`
    /// Default: `5000`
    pub db_checkout_timeout_ms: u64,

    /// Free-tier swipes per profile per UTC day.
    /// Env: `DAILY_SWIPE_LIMIT`
    pub daily_swipe_limit: u32,

    /// Days after a match before an untouched conversation expires (0 = never).
    /// Env: `CONVERSATION_TTL_DAYS`, at most 3650
    pub conversation_ttl_days: i64,

    /// Typing indicator TTL in milliseconds.
    /// Env: `TYPING_TTL_MS`, at most 60000
    pub typing_ttl_ms: u64,

    /// Ed25519 public key of the billing service (hex-encoded, 64 chars).
    /// Env: `ENTITLEMENT_PUBKEY`
    /// Default: all-zeros (development only; rejects every token).
    pub entitlement_pubkey: [u8; 32],

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Header carrying the authenticated profile id, set by the auth gateway.
    /// Env: `IDENTITY_HEADER`
    /// Default: `x-profile-id`
    pub identity_header: String,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./tandem.db"),
            db_pool_size: 4,
            db_checkout_timeout_ms: 5_000,
            daily_swipe_limit: DAILY_SWIPE_LIMIT,
            conversation_ttl_days: DEFAULT_CONVERSATION_TTL_DAYS,
            typing_ttl_ms: TYPING_TTL_MS,
            entitlement_pubkey: [0u8; 32],
            admin_token: None,
            identity_header: "x-profile-id".to_string(),
            instance_name: format!("{APP_NAME} Node"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        if let Some(n) = parse_var::<u32>(&lookup, "DB_POOL_SIZE") {
            config.db_pool_size = n.max(1);
        }

        if let Some(ms) =
            parse_bounded(&lookup, "DB_CHECKOUT_TIMEOUT_MS", 1, MAX_DB_CHECKOUT_TIMEOUT_MS)
        {
            config.db_checkout_timeout_ms = ms;
        }

        if let Some(n) = parse_var::<u32>(&lookup, "DAILY_SWIPE_LIMIT") {
            config.daily_swipe_limit = n;
        }

        if let Some(days) =
            parse_bounded(&lookup, "CONVERSATION_TTL_DAYS", 0, MAX_CONVERSATION_TTL_DAYS)
        {
            config.conversation_ttl_days = days;
        }

        if let Some(ms) = parse_bounded(&lookup, "TYPING_TTL_MS", 0, MAX_TYPING_TTL_MS) {
            config.typing_ttl_ms = ms;
        }

        if let Some(hex_key) = lookup("ENTITLEMENT_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.entitlement_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid ENTITLEMENT_PUBKEY, using default (dev-only)"
                    );
                }
            }
        }

        if let Some(token) = lookup("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Some(header) = lookup("IDENTITY_HEADER") {
            let header = header.trim().to_ascii_lowercase();
            if axum::http::HeaderName::from_bytes(header.as_bytes()).is_ok() {
                config.identity_header = header;
            } else {
                tracing::warn!(value = %header, "Invalid IDENTITY_HEADER, using default");
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

/// [`parse_var`] restricted to `min..=max`.
fn parse_bounded<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    min: T,
    max: T,
) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    let value = parse_var::<T>(lookup, key)?;
    if value < min || value > max {
        tracing::warn!(
            variable = key,
            value = %value,
            min = %min,
            max = %max,
            "Value out of range, using default"
        );
        return None;
    }
    Some(value)
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex_key: &str) -> Result<[u8; 32], String> {
    let hex_key = hex_key.trim();
    if hex_key.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_key.len()));
    }
    let bytes = hex::decode(hex_key).map_err(|e| e.to_string())?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
