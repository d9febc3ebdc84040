//! Read-deadline liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No client activity within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection's read deadline.
///
/// Every `check_every` the time since the last client activity is compared
/// with `timeout`; once it is exceeded the loop returns
/// [`HeartbeatResult::TimedOut`]. Any inbound frame counts as activity,
/// including pongs to the server's pings and protocol heartbeats.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    check_every: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(check_every);
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.idle_for() >= timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_core::ConnectionId;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(ClientConnection::new(ConnectionId::from("hb_conn"), tx))
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        let handle = tokio::spawn(async move {
            run_heartbeat(conn, Duration::from_secs(100), Duration::from_secs(300), cancel2).await
        });

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let conn = make_connection();
        let result = run_heartbeat(
            conn,
            Duration::from_millis(10),
            Duration::from_millis(30),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test]
    async fn active_connection_stays_open() {
        let conn = make_connection();
        let conn2 = Arc::clone(&conn);
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        let handle = tokio::spawn(async move {
            run_heartbeat(
                conn2,
                Duration::from_millis(20),
                Duration::from_millis(300),
                cancel2,
            )
            .await
        });

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            conn.mark_alive();
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test]
    async fn times_out_after_activity_stops() {
        let conn = make_connection();
        conn.mark_alive();
        let started = std::time::Instant::now();
        let result = run_heartbeat(
            conn,
            Duration::from_millis(10),
            Duration::from_millis(100),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
