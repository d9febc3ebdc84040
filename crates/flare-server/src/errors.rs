//! Transport errors.

/// A failure of the listener or a connection's channel.
///
/// Fatal to the connection it occurs on, never to the server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding or inspecting the listener failed.
    #[error("listener error: {0}")]
    Listen(#[from] std::io::Error),
    /// Reading from or writing to the socket failed.
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),
}
