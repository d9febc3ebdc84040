//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use flare_live::{LiveConnection, SessionManager};
use flare_protocol::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::handle_frame;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::{ConnectionRegistry, ConnectionSlot};
use crate::config::ServerConfig;
use crate::errors::TransportError;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer gets to flush queued frames after the read side ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What a connection's session loop needs from the server.
#[derive(Clone)]
pub struct WsContext {
    /// Session table.
    pub manager: Arc<SessionManager>,
    /// Open connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Transport settings.
    pub config: Arc<ServerConfig>,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the socket.
    ClientClosed,
    /// No client activity within the heartbeat timeout.
    TimedOut,
    /// Reading from or writing to the socket failed.
    TransportError,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TimedOut => "timed_out",
            Self::TransportError => "transport_error",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Run a WebSocket session for a connected client.
pub async fn run_ws_session(ws: WebSocket, slot: ConnectionSlot, ctx: WsContext) {
    let (ws_tx, ws_rx) = ws.split();
    run_session_io(ws_tx, ws_rx, slot, ctx).await;
}

/// Drive a session over a socket's two halves.
///
/// 1. Forwards queued frames to the sink and pings on an interval
/// 2. Decodes inbound frames and dispatches them to the session manager
/// 3. Runs broadcasts delivered to the connection's inbox through its view
/// 4. Closes on client close, read deadline, read or write error, or shutdown
/// 5. Tears the session down exactly once
#[instrument(skip_all, fields(connection_id = %slot.id()))]
pub async fn run_session_io<W, R>(mut ws_tx: W, mut ws_rx: R, slot: ConnectionSlot, ctx: WsContext)
where
    W: Sink<WsMessage, Error = axum::Error> + Unpin + Send + 'static,
    R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let connection_id = slot.id().clone();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(ctx.config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));
    ctx.registry.insert(Arc::clone(&connection));

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Outbound forwarder with periodic Ping frames. Ends once every sender
    // is gone and the queue is drained, or as soon as a write fails.
    let ping_every = ctx.config.ping_interval;
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(text) => ws_tx.send(WsMessage::Text(text.into())).await?,
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    ws_tx.send(WsMessage::Ping(Vec::<u8>::new().into())).await?;
                }
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
        let _ = ws_tx.close().await;
        Ok::<(), axum::Error>(())
    });
    let mut writer_finished = false;

    let mut live = ctx.manager.connect(connection_id.clone());
    let mut heartbeat = Box::pin(run_heartbeat(
        Arc::clone(&connection),
        ctx.config.heartbeat_check_interval(),
        ctx.config.heartbeat_timeout,
        ctx.shutdown.child_token(),
    ));

    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(error)) => {
                        warn!(error = %TransportError::from(error), "websocket read failed");
                        break CloseReason::TransportError;
                    }
                    None => break CloseReason::ClientClosed,
                };
                connection.mark_alive();

                let reply = match msg {
                    WsMessage::Text(text) => {
                        handle_frame(text.as_str().as_bytes(), &mut live).await
                    }
                    WsMessage::Binary(data) => handle_frame(&data, &mut live).await,
                    WsMessage::Close(_) => {
                        debug!("client sent close frame");
                        break CloseReason::ClientClosed;
                    }
                    WsMessage::Ping(_) | WsMessage::Pong(_) => None,
                };
                if let Some(reply) = reply {
                    deliver(&connection, &live, &reply);
                }
            }
            Some(item) = live.next_info() => {
                if let Some(frame) = live.handle_info(item).await {
                    deliver(&connection, &live, &frame);
                }
            }
            // The queue stays open while `connection` lives, so the writer
            // only finishes here when the socket refused a write.
            result = &mut writer => {
                writer_finished = true;
                match result {
                    Ok(Err(error)) => {
                        warn!(error = %TransportError::from(error), "websocket write failed");
                    }
                    Ok(Ok(())) => debug!("writer stopped"),
                    Err(error) => warn!(error = %error, "writer task failed"),
                }
                break CloseReason::TransportError;
            }
            result = &mut heartbeat => {
                break match result {
                    HeartbeatResult::TimedOut => {
                        let idle = connection.idle_for().as_millis();
                        warn!(
                            idle_ms = u64::try_from(idle).unwrap_or(u64::MAX),
                            "client unresponsive, disconnecting"
                        );
                        CloseReason::TimedOut
                    }
                    HeartbeatResult::Cancelled => CloseReason::Shutdown,
                };
            }
            () = ctx.shutdown.cancelled() => break CloseReason::Shutdown,
        }
    };

    // Clean up
    close_session(&mut live, &connection, reason);
    drop(heartbeat);
    let _ = ctx.registry.remove(&connection_id);
    let dropped = connection.drop_count();
    drop(connection);

    if !writer_finished
        && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
    {
        debug!("writer did not drain in time, aborting");
        writer.abort();
    }

    info!(reason = reason.as_str(), dropped, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    drop(slot);
}

/// Queue `frame`; if it is dropped the client may now be out of step, so the
/// session's next patch is sent in full.
fn deliver(connection: &ClientConnection, live: &LiveConnection, frame: &Message) {
    if !connection.send(frame) {
        debug!(event = %frame.event, "outbound frame not queued");
        live.mark_desynced();
    }
}

/// Tear down the session. On server shutdown the client is told with a
/// `phx_close` for the topic it had joined.
fn close_session(live: &mut LiveConnection, connection: &ClientConnection, reason: CloseReason) {
    let close_frame = live.close();
    if reason == CloseReason::Shutdown {
        if let Some(frame) = close_frame {
            let _ = connection.send(&frame);
        }
    }
}
