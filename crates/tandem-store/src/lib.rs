//! # tandem-store
//!
//! SQLite storage for the Tandem swipe/match/conversation engine.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`, plus per-table operations that take a plain
//! `&Connection`. Taking the connection rather than the handle lets the
//! engine compose several table operations inside one
//! [`Database::write`] transaction.

pub mod blocks;
pub mod conversations;
pub mod database;
pub mod interactions;
pub mod matches;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod profiles;
pub mod quota;

mod columns;
mod error;

#[cfg(test)]
mod test_support;

pub use columns::to_stored_precision;
pub use database::Database;
pub use error::{Result, StoreError};
pub use pool::{open_pool, Pool, PooledDatabase};
pub use models::*;
