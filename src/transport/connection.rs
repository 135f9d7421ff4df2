//! WebSocket connection and event loop.
//!
//! This module owns the single long-lived WebSocket to the node's PubSub
//! endpoint, including frame routing and reconnection.
//!
//! # Event Loop
//!
//! The connection spawns one tokio task that handles:
//!
//! - Incoming text frames (responses and notifications), handed to the
//!   registered [`ConnectionObserver`] in arrival order
//! - Outgoing frames from every caller, written strictly one at a time
//! - Reconnection with jittered exponential backoff after a drop
//! - Broadcasting [`ConnectionEvent`]s to dependents

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::metrics::Metrics;

use super::backoff::Backoff;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the connection event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default deadline for the TCP connect plus WebSocket upgrade.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle notifications broadcast to dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket was opened for the first time (or after a give-up).
    Connected,
    /// The socket dropped; in-flight calls and subscriptions are void.
    Dropped,
    /// A reconnect attempt succeeded.
    Reconnected {
        /// One-based attempt number that succeeded.
        attempt: u32,
    },
    /// Every reconnect attempt failed.
    Lost {
        /// Attempts made.
        attempts: u32,
    },
    /// The socket was closed by [`shutdown`](super::ConnectionManager::shutdown).
    Closed,
}

/// Receives frames and lifecycle events from the event loop.
///
/// Both methods run on the reader task and must not block: slow work has to
/// be queued or spawned.
pub trait ConnectionObserver: Send + Sync {
    /// Called for each text frame, in arrival order.
    fn on_frame(&self, text: &str);

    /// Called for each lifecycle transition, before it is broadcast.
    fn on_event(&self, event: ConnectionEvent);
}

/// Reconnection bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay bounds between attempts.
    pub backoff: Backoff,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Deadline for each handshake; an expired handshake is a failed attempt.
    pub connect_timeout: Duration,
}

/// Socket state shared between callers and the event loop.
pub(crate) enum WsState {
    /// No socket; the next send connects lazily.
    Idle,
    /// Socket open; frames go through this sender.
    Open(mpsc::UnboundedSender<String>),
    /// Socket dropped, reconnect in progress; sends fail fast.
    Reconnecting,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared by the connection manager and its event loop.
pub(crate) struct Shared {
    pub state: Mutex<WsState>,
    pub observer: Mutex<Option<Weak<dyn ConnectionObserver>>>,
    pub events: broadcast::Sender<ConnectionEvent>,
    pub shutdown: CancellationToken,
    pub metrics: Arc<Metrics>,
}

impl Shared {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(WsState::Idle),
            observer: Mutex::new(None),
            events,
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    fn observer(&self) -> Option<Arc<dyn ConnectionObserver>> {
        self.observer.lock().as_ref().and_then(Weak::upgrade)
    }

    fn dispatch_frame(&self, text: &str) {
        trace!(bytes = text.len(), "Frame received");
        if let Some(observer) = self.observer() {
            observer.on_frame(text);
        }
    }

    /// Notifies the observer synchronously, then broadcasts.
    pub fn emit(&self, event: ConnectionEvent) {
        debug!(?event, "Connection event");
        if let Some(observer) = self.observer() {
            observer.on_event(event);
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Why the pump returned.
enum PumpExit {
    Dropped,
    Shutdown,
}

/// Outcome of the reconnect loop.
enum ReconnectOutcome {
    Connected { stream: WsStream, attempt: u32 },
    GaveUp { attempts: u32 },
    Shutdown,
}

/// Opens a WebSocket to `url`, giving up after `deadline`.
pub(crate) async fn open(url: &Url, deadline: Duration) -> Result<WsStream> {
    let (stream, _response) = timeout(deadline, connect_async(url.as_str()))
        .await
        .map_err(|_| {
            Error::connection(format!(
                "WebSocket handshake with {url} timed out after {}ms",
                deadline.as_millis()
            ))
        })?
        .map_err(|e| Error::connection(format!("WebSocket connect to {url} failed: {e}")))?;
    Ok(stream)
}

/// Runs until shutdown or until reconnection gives up.
///
/// Holds its own sender so the command channel survives reconnects.
pub(crate) async fn run_event_loop(
    mut stream: WsStream,
    command_tx: mpsc::UnboundedSender<String>,
    mut command_rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    url: Url,
    policy: ReconnectPolicy,
) {
    loop {
        match pump(stream, &mut command_rx, &shared).await {
            PumpExit::Shutdown => {
                *shared.state.lock() = WsState::Idle;
                shared.emit(ConnectionEvent::Closed);
                break;
            }
            PumpExit::Dropped => {
                *shared.state.lock() = WsState::Reconnecting;
                shared.emit(ConnectionEvent::Dropped);
            }
        }

        match reconnect(&url, policy, &shared.shutdown).await {
            ReconnectOutcome::Connected {
                stream: fresh,
                attempt,
            } => {
                // Frames queued for the dead socket belong to calls already failed.
                let mut discarded = 0usize;
                while command_rx.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    debug!(discarded, "Discarded frames queued during reconnect");
                }

                *shared.state.lock() = WsState::Open(command_tx.clone());
                shared.metrics.reconnect();
                info!(%url, attempt, "WebSocket reconnected");
                shared.emit(ConnectionEvent::Reconnected { attempt });
                stream = fresh;
            }
            ReconnectOutcome::GaveUp { attempts } => {
                *shared.state.lock() = WsState::Idle;
                warn!(%url, attempts, "WebSocket reconnect gave up");
                shared.emit(ConnectionEvent::Lost { attempts });
                break;
            }
            ReconnectOutcome::Shutdown => {
                *shared.state.lock() = WsState::Idle;
                shared.emit(ConnectionEvent::Closed);
                break;
            }
        }
    }

    debug!("Event loop terminated");
}

/// Moves frames in both directions until the socket ends.
async fn pump(
    stream: WsStream,
    command_rx: &mut mpsc::UnboundedReceiver<String>,
    shared: &Shared,
) -> PumpExit {
    let (mut ws_write, mut ws_read) = stream.split();

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => {
                debug!("Shutdown requested");
                let _ = ws_write.send(Message::Close(None)).await;
                let _ = ws_write.close().await;
                return PumpExit::Shutdown;
            }

            // Incoming frames from the node
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => shared.dispatch_frame(&text),

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by remote");
                        return PumpExit::Dropped;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        return PumpExit::Dropped;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        return PumpExit::Dropped;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Outgoing frames, the only write path
            frame = command_rx.recv() => {
                match frame {
                    Some(text) => {
                        trace!(bytes = text.len(), "Frame sent");
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "WebSocket write failed");
                            return PumpExit::Dropped;
                        }
                    }
                    None => return PumpExit::Shutdown,
                }
            }
        }
    }
}

/// Retries the connection with jittered backoff.
async fn reconnect(
    url: &Url,
    policy: ReconnectPolicy,
    shutdown: &CancellationToken,
) -> ReconnectOutcome {
    for attempt in 0..policy.max_attempts {
        let delay = policy.backoff.delay(attempt);
        debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Reconnecting");

        tokio::select! {
            _ = shutdown.cancelled() => return ReconnectOutcome::Shutdown,
            _ = sleep(delay) => {}
        }

        let attempted = tokio::select! {
            _ = shutdown.cancelled() => return ReconnectOutcome::Shutdown,
            attempted = open(url, policy.connect_timeout) => attempted,
        };

        match attempted {
            Ok(stream) => {
                return ReconnectOutcome::Connected {
                    stream,
                    attempt: attempt + 1,
                };
            }
            Err(e) => warn!(attempt = attempt + 1, error = %e, "Reconnect attempt failed"),
        }
    }

    ReconnectOutcome::GaveUp {
        attempts: policy.max_attempts,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ConnectionEvent>>,
    }

    impl ConnectionObserver for Recorder {
        fn on_frame(&self, _text: &str) {}

        fn on_event(&self, event: ConnectionEvent) {
            self.events.lock().push(event);
        }
    }

    #[test]
    fn test_emit_reaches_observer_and_broadcast() {
        let shared = Shared::new(Arc::new(Metrics::new()));
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn ConnectionObserver> = recorder.clone();
        *shared.observer.lock() = Some(Arc::downgrade(&observer));
        let mut rx = shared.events.subscribe();

        shared.emit(ConnectionEvent::Dropped);

        assert_eq!(*recorder.events.lock(), vec![ConnectionEvent::Dropped]);
        assert_eq!(rx.try_recv().unwrap(), ConnectionEvent::Dropped);
    }

    #[test]
    fn test_emit_without_observer() {
        let shared = Shared::new(Arc::new(Metrics::new()));
        shared.emit(ConnectionEvent::Closed);
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_against_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}")).unwrap();
        let policy = ReconnectPolicy {
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(2)),
            max_attempts: 2,
            connect_timeout: Duration::from_secs(2),
        };

        let outcome = reconnect(&url, policy, &CancellationToken::new()).await;
        assert!(matches!(outcome, ReconnectOutcome::GaveUp { attempts: 2 }));
    }

    /// Accepts TCP connections and never answers the upgrade request.
    async fn silent_listener() -> (Url, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}", listener.local_addr().unwrap())).unwrap();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (url, task)
    }

    #[tokio::test]
    async fn test_open_times_out_on_stalled_handshake() {
        let (url, task) = silent_listener().await;

        let started = tokio::time::Instant::now();
        let err = open(&url, Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(err, Error::Connection { .. }));
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));
        task.abort();
    }

    #[tokio::test]
    async fn test_reconnect_counts_stalled_handshakes_as_failures() {
        let (url, task) = silent_listener().await;
        let policy = ReconnectPolicy {
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(2)),
            max_attempts: 3,
            connect_timeout: Duration::from_millis(50),
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            reconnect(&url, policy, &CancellationToken::new()),
        )
        .await
        .expect("reconnect must give up within its bounds");

        assert!(matches!(outcome, ReconnectOutcome::GaveUp { attempts: 3 }));
        task.abort();
    }
}
