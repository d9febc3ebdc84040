//! Branded ID newtypes.
//!
//! Connections and pubsub subscribers are keyed by strings on the wire and in
//! the registries. Wrapping them keeps the two namespaces apart at compile
//! time. New IDs are UUID v7 so they sort by creation time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a fresh time-ordered ID.
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, Uuid::now_v7().simple()))
            }

            /// Wrap an existing string.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

branded_id! {
    /// Identifies one physical WebSocket connection for its whole lifetime.
    ConnectionId, "conn_"
}

branded_id! {
    /// Identifies one handler registered on a pubsub topic.
    SubscriberId, "sub_"
}

impl From<&ConnectionId> for SubscriberId {
    /// A session subscribes under its connection's id, so leaving the session
    /// can find every handler it registered.
    fn from(id: &ConnectionId) -> Self {
        Self(id.0.clone())
    }
}
