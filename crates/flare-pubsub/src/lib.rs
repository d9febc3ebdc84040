//! # flare-pubsub
//!
//! Topic fan-out between sessions.
//!
//! - [`PubSubBus`]: the upstream transport. [`LocalPubSub`] delivers within
//!   the process on a bounded worker pool; a multi-node bus can replace it.
//! - [`Broadcaster`]: keeps per-topic subscriber sets, opens one upstream
//!   subscription per topic, and fans each delivery out to every handler.
//! - [`Subscription`]: the explicit unsubscribe token returned by
//!   [`Broadcaster::subscribe`].

#![deny(unsafe_code)]

pub mod broadcaster;
pub mod bus;
pub mod errors;

pub use broadcaster::{Broadcaster, Subscriber, Subscription};
pub use bus::{Broadcast, LocalPubSub, PubSubBus, TopicSink};
pub use errors::PubSubError;
