//! Premium entitlement verification and caching.
//!
//! Verifies `EntitlementToken`s issued by the billing service using
//! ed25519-dalek, and caches successful verifications so the swipe path
//! never re-checks signatures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use tandem_shared::premium::{check_entitlement_with_key, EntitlementToken};
use tandem_shared::types::ProfileId;

/// Billing collaborator: whether a profile is exempt from the daily quota.
#[async_trait]
pub trait Entitlement: Send + Sync {
    async fn is_premium(&self, profile: ProfileId) -> bool;
}

// ---------------------------------------------------------------------------
// Cached entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedStatus {
    valid: bool,
    valid_until: DateTime<Utc>,
}

impl CachedStatus {
    /// An entry is stale once the entitlement has run out.
    fn is_fresh(&self) -> bool {
        self.valid && Utc::now() < self.valid_until
    }
}

// ---------------------------------------------------------------------------
// Premium verifier
// ---------------------------------------------------------------------------

/// Verifies and caches premium status per profile.
#[derive(Clone)]
pub struct PremiumVerifier {
    /// The billing service's Ed25519 public key.
    billing_pubkey: [u8; 32],
    cache: Arc<RwLock<HashMap<ProfileId, CachedStatus>>>,
}

impl PremiumVerifier {
    pub fn new(billing_pubkey: [u8; 32]) -> Self {
        Self {
            billing_pubkey,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Verify an entitlement token and remember the result.
    ///
    /// Returns `true` if the token is valid and not expired. A failed
    /// verification never downgrades an entitlement that is already cached.
    pub async fn verify(&self, token: &EntitlementToken) -> bool {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&token.profile_id) {
                if entry.is_fresh() && entry.valid_until >= token.valid_until {
                    debug!(profile = %token.profile_id, "Premium status served from cache");
                    return true;
                }
            }
        }

        let valid = check_entitlement_with_key(token, &self.billing_pubkey);

        if valid {
            let mut cache = self.cache.write().await;
            cache.insert(
                token.profile_id,
                CachedStatus {
                    valid,
                    valid_until: token.valid_until,
                },
            );
            info!(
                profile = %token.profile_id,
                until = %token.valid_until,
                "Premium status verified"
            );
        } else {
            debug!(profile = %token.profile_id, "Premium verification failed");
        }

        valid
    }

    /// Whether a profile has a cached, still-valid entitlement.
    pub async fn is_premium_cached(&self, profile: ProfileId) -> bool {
        let cache = self.cache.read().await;
        cache
            .get(&profile)
            .map(|entry| entry.is_fresh())
            .unwrap_or(false)
    }

    /// Grant premium without a token (admin action). Lasts until revoked.
    pub async fn admin_grant(&self, profile: ProfileId) {
        let mut cache = self.cache.write().await;
        cache.insert(
            profile,
            CachedStatus {
                valid: true,
                valid_until: Utc::now() + Duration::days(36500),
            },
        );
    }

    pub async fn admin_revoke(&self, profile: ProfileId) {
        let mut cache = self.cache.write().await;
        cache.remove(&profile);
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Evict expired entries from the cache.
    pub async fn purge_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.is_fresh());
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, "Purged expired premium cache entries");
        }
    }
}

#[async_trait]
impl Entitlement for PremiumVerifier {
    async fn is_premium(&self, profile: ProfileId) -> bool {
        self.is_premium_cached(profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use tandem_shared::premium::create_entitlement_token;

    #[tokio::test]
    async fn test_verify_valid_token() {
        let billing_key = SigningKey::generate(&mut OsRng);
        let verifier = PremiumVerifier::new(billing_key.verifying_key().to_bytes());
        let profile = ProfileId::new();

        let token =
            create_entitlement_token(profile, Utc::now() + Duration::days(30), &billing_key);

        assert!(!verifier.is_premium(profile).await);
        assert!(verifier.verify(&token).await);
        assert!(verifier.is_premium(profile).await);
        assert!(!verifier.is_premium(ProfileId::new()).await);
    }

    #[tokio::test]
    async fn test_verify_expired_token() {
        let billing_key = SigningKey::generate(&mut OsRng);
        let verifier = PremiumVerifier::new(billing_key.verifying_key().to_bytes());
        let profile = ProfileId::new();

        let token = create_entitlement_token(profile, Utc::now() - Duration::days(1), &billing_key);

        assert!(!verifier.verify(&token).await);
        assert!(!verifier.is_premium(profile).await);
        assert_eq!(verifier.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_verify_wrong_key() {
        let billing_key = SigningKey::generate(&mut OsRng);
        let wrong_key = SigningKey::generate(&mut OsRng);
        let verifier = PremiumVerifier::new(wrong_key.verifying_key().to_bytes());

        let token =
            create_entitlement_token(ProfileId::new(), Utc::now() + Duration::days(30), &billing_key);

        assert!(!verifier.verify(&token).await);
    }

    #[tokio::test]
    async fn test_admin_grant_and_revoke() {
        let verifier = PremiumVerifier::new([0u8; 32]);
        let profile = ProfileId::new();

        verifier.admin_grant(profile).await;
        assert!(verifier.is_premium(profile).await);

        verifier.purge_expired().await;
        assert_eq!(verifier.cached_count().await, 1);

        verifier.admin_revoke(profile).await;
        assert!(!verifier.is_premium(profile).await);
    }
}
