//! # flare-core
//!
//! Shared vocabulary for the Flare crates:
//!
//! - **Branded IDs**: [`ConnectionId`] and [`SubscriberId`] as newtypes so a
//!   connection id is never confused with a topic name or a message ref
//! - **Logging**: [`logging::init_subscriber`] for the binary and
//!   [`logging::capture_logs`] for tests that assert on log output

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{ConnectionId, SubscriberId};
