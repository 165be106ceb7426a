//! Pooled access to the SQLite store from async handlers.
//!
//! Connections come from an [`r2d2`] pool of migrated [`Database`] handles.
//! Checkout and the work itself run on the blocking thread pool, so a slow
//! write never stalls the runtime. SQLite serializes writers across
//! connections.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tandem_store::{open_pool, Database, Pool, StoreError};
use tracing::warn;

use crate::error::ServerError;

#[derive(Clone)]
pub struct StoreHandle {
    pool: Pool,
}

impl StoreHandle {
    /// Open a pool of `size` connections to the database file at `path`.
    pub fn open(path: &Path, size: u32, checkout_timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            pool: open_pool(path, size, checkout_timeout)?,
        })
    }

    #[cfg(test)]
    pub fn size(&self) -> u32 {
        self.pool.max_size()
    }

    /// Run `f` once on a pooled connection.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, ServerError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = pool.get().map_err(StoreError::from)?;
            f(&mut *db)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("store task failed: {e}")))?
    }

    /// Run `f`, retrying once if the first attempt hit lock contention.
    ///
    /// Only for operations whose effects are keyed by a natural idempotency
    /// key, so a second attempt cannot double-apply.
    pub async fn run_idempotent<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: Fn(&mut Database) -> Result<T, ServerError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        let first = {
            let f = Arc::clone(&f);
            self.run(move |db| f(db)).await
        };
        match first {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient storage failure, retrying once");
                self.run(move |db| f(db)).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_store(dir: &tempfile::TempDir, size: u32) -> StoreHandle {
    StoreHandle::open(&dir.path().join("tandem.db"), size, Duration::from_secs(5))
        .expect("store pool")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn runs_on_pooled_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir, 3);
        assert_eq!(store.size(), 3);

        let version: u32 = store
            .run(|db| {
                Ok(db
                    .conn()
                    .pragma_query_value(None, "user_version", |row| row.get(0))
                    .map_err(StoreError::from)?)
            })
            .await
            .unwrap();
        assert_eq!(version, tandem_store::migrations::CURRENT_VERSION);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir, 1);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), ServerError> = store
            .run_idempotent(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ServerError::Conflict("nope".into()))
            })
            .await;

        assert!(matches!(result, Err(ServerError::Conflict(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn busy_pool_surfaces_as_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreHandle::open(&dir.path().join("tandem.db"), 1, Duration::from_millis(200))
            .unwrap();

        let (held_tx, held_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .run(move |_| {
                        let _ = held_tx.send(());
                        let _ = release_rx.recv();
                        Ok(())
                    })
                    .await
            })
        };
        held_rx.await.unwrap();

        let result = store.run(|_| Ok(())).await;
        assert!(matches!(result, Err(ServerError::Store(StoreError::Pool(_)))));

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        assert!(store.run(|_| Ok(())).await.is_ok());
    }
}
