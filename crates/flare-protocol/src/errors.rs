//! Codec errors.

/// A frame or payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a valid JSON object with `topic` and `event`.
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),

    /// The payload does not match the type the event requires, either
    /// directly or after unwrapping a string-encoded payload.
    #[error("malformed {expected} payload: {source}")]
    Payload {
        /// Name of the payload type.
        expected: &'static str,
        /// The error from the direct decode attempt.
        #[source]
        source: serde_json::Error,
    },
}

/// An outbound frame could not be built.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The payload failed to serialize.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
