//! Pubsub errors.

/// A publish that could not be handed to the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PubSubError {
    /// The dispatch queue is full; the delivery was dropped.
    #[error("dispatch queue full, dropped message for topic {topic}")]
    QueueFull {
        /// Topic of the dropped message.
        topic: String,
    },

    /// The bus has shut down.
    #[error("pubsub bus is closed")]
    Closed,
}
