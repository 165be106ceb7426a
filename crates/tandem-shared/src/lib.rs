//! # tandem-shared
//!
//! Types and pure policy shared by the Tandem store and server: identifier
//! newtypes, swipe directions, moderation flags, the conversation expiry
//! rule, signed premium entitlements, and the realtime wire protocol.

pub mod constants;
pub mod error;
pub mod expiry;
pub mod premium;
pub mod protocol;
pub mod types;

pub use error::SharedError;
