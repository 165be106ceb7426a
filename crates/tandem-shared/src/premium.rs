use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::types::ProfileId;

/// Premium entitlement issued and signed by the billing service. Clients
/// present it once; the server caches the result until `valid_until`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementToken {
    pub profile_id: ProfileId,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

// payload = profile uuid bytes || valid_until (rfc3339)
fn signing_payload(profile_id: &ProfileId, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(48);
    payload.extend_from_slice(profile_id.0.as_bytes());
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

pub fn check_entitlement_with_key(token: &EntitlementToken, billing_pubkey: &[u8; 32]) -> bool {
    if Utc::now() > token.valid_until {
        return false;
    }

    let Ok(verifying_key) = VerifyingKey::from_bytes(billing_pubkey) else {
        return false;
    };

    let Ok(signature) = Signature::from_slice(&token.signature) else {
        return false;
    };

    let payload = signing_payload(&token.profile_id, &token.valid_until);
    verifying_key.verify(&payload, &signature).is_ok()
}

pub fn create_entitlement_token(
    profile_id: ProfileId,
    valid_until: DateTime<Utc>,
    billing_signing_key: &ed25519_dalek::SigningKey,
) -> EntitlementToken {
    use ed25519_dalek::Signer;

    let signature = billing_signing_key.sign(&signing_payload(&profile_id, &valid_until));

    EntitlementToken {
        profile_id,
        valid_until,
        signature: signature.to_bytes().to_vec(),
    }
}
