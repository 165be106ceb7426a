//! Connection pooling over [`Database`] handles.
//!
//! Every pooled connection is a fully prepared [`Database`] (pragmas set,
//! schema migrated). The schema is migrated once before the pool is built so
//! connections opened concurrently never race on setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database::Database;
use crate::error::{Result, StoreError};

pub type Pool = r2d2::Pool<DatabaseManager>;
pub type PooledDatabase = r2d2::PooledConnection<DatabaseManager>;

/// Opens [`Database`] handles on one file for [`r2d2`].
#[derive(Debug)]
pub struct DatabaseManager {
    path: PathBuf,
}

impl DatabaseManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl r2d2::ManageConnection for DatabaseManager {
    type Connection = Database;
    type Error = StoreError;

    fn connect(&self) -> Result<Database> {
        Database::open_at(&self.path)
    }

    fn is_valid(&self, db: &mut Database) -> Result<()> {
        db.conn().execute_batch("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, _db: &mut Database) -> bool {
        false
    }
}

/// Build a pool of `size` connections to the database at `path`.
///
/// A checkout waits at most `checkout_timeout` for a free connection.
pub fn open_pool(path: &Path, size: u32, checkout_timeout: Duration) -> Result<Pool> {
    Database::open_at(path)?;

    let pool = r2d2::Pool::builder()
        .max_size(size.max(1))
        .connection_timeout(checkout_timeout.max(Duration::from_millis(1)))
        .test_on_check_out(true)
        .build(DatabaseManager::new(path))?;

    tracing::debug!(
        path = %path.display(),
        connections = pool.max_size(),
        "opened connection pool"
    );
    Ok(pool)
}
