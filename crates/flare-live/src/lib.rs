//! # flare-live
//!
//! Server-side live views and the session state machine behind them.
//!
//! A connection starts **Connected**. A successful join mounts a view for the
//! requested topic and moves it to **Joined**; a leave returns it to
//! Connected, and a transport close makes it **Closed** for good. While
//! joined, each client event runs the view's handler, re-renders, and replies
//! with the diff against the last tree the client was sent.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`view`] | [`LiveView`] callbacks, [`ViewRegistry`], [`SessionVerifier`] |
//! | [`context`] | [`ViewContext`]: topic subscriptions and publishing |
//! | [`manager`] | [`SessionManager`] table and [`LiveConnection`] transitions |
//! | [`session`] | [`Snapshot`] diffing with resync |

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod manager;
pub mod session;
pub mod view;

pub use context::{InboxMessage, ViewContext};
pub use errors::{LiveError, ViewError};
pub use manager::{ConnectionState, LiveConnection, SessionConfig, SessionManager};
pub use session::Snapshot;
pub use view::{AcceptAll, LiveView, Params, SessionVerifier, ViewFactory, ViewRegistry};
