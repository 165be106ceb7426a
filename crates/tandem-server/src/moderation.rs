//! Moderation collaborator: the engine only reads a profile's flags.

use async_trait::async_trait;

use tandem_shared::types::{ProfileId, ProfileStatus};
use tandem_store::profiles;

use crate::db::StoreHandle;
use crate::error::ServerError;

#[async_trait]
pub trait ProfileStatusSource: Send + Sync {
    /// `None` when the profile is unknown.
    async fn status(&self, profile: ProfileId) -> Result<Option<ProfileStatus>, ServerError>;
}

/// Reads flags from the `profiles` table, which the admin API maintains.
#[derive(Clone)]
pub struct StoreProfileStatus {
    store: StoreHandle,
}

impl StoreProfileStatus {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProfileStatusSource for StoreProfileStatus {
    async fn status(&self, profile: ProfileId) -> Result<Option<ProfileStatus>, ServerError> {
        self.store
            .run(move |db| Ok(profiles::status(db.conn(), profile)?))
            .await
    }
}
