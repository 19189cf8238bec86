//! Push channel client.
//!
//! Keeps one connection to the backend's `/ws` endpoint open, decodes each
//! text frame into an [`Event`], and fans the results out to subscribers in
//! arrival order. The connection is re-established after drops; events missed
//! while disconnected are not replayed, so consumers should pull a fresh
//! snapshot on every [`StreamItem::Connected`].
//!
//! ## Architecture
//!
//! - `connector`: the transport seam; `WsConnector` talks WebSocket
//! - `simulated`: scripted connector for driving the client without a socket

pub mod connector;
pub mod simulated;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::models::Event;
use crate::error::DecodeError;
use crate::logging::LogThrottle;

pub use connector::{Connector, FrameStream, WsConnector};
pub use simulated::{ScriptedConnector, ScriptedSession};

const CHANNEL_CAPACITY: usize = 1024;

/// What subscribers see, in arrival order.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Connected,
    Event(Event),
    /// A frame was dropped because it did not decode. The connection stays up.
    DecodeFailed(DecodeError),
    Disconnected { reason: String },
    /// This subscriber fell behind and lost `missed` items.
    Gap { missed: u64 },
}

/// Capped exponential backoff between failed connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    pub fn next_delay(&self, current: Duration) -> Duration {
        if current.is_zero() {
            return self.initial.min(self.max);
        }
        (current + current).min(self.max)
    }
}

/// Auto-reconnecting client for the push channel.
pub struct EventStreamClient {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    tx: broadcast::Sender<StreamItem>,
    cancel: CancellationToken,
    /// Cancelled by the connection task after its last send.
    finished: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventStreamClient {
    pub fn new(connector: impl Connector, policy: ReconnectPolicy) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            connector: Arc::new(connector),
            policy,
            tx,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            task: None,
        }
    }

    /// Subscribe to the live item sequence. Items sent before the call are not seen.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            finished: self.finished.clone(),
        }
    }

    /// Start the connection task. Does nothing if already started or closed.
    pub fn connect(&mut self) {
        if self.task.is_some() {
            debug!("Push channel already started");
            return;
        }
        if self.cancel.is_cancelled() {
            warn!("Push channel was closed; not reconnecting");
            return;
        }

        let task = ConnectionTask {
            connector: self.connector.clone(),
            policy: self.policy,
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
            finished: self.finished.clone(),
        };
        self.task = Some(tokio::spawn(task.run()));
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some() && !self.cancel.is_cancelled()
    }

    /// Stop for good. Subscriptions end after draining what was already sent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if self.task.is_none() {
            self.finished.cancel();
        }
    }

    /// Close and wait for the connection task to exit.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// A lazy, ordered view of the push channel for one consumer.
pub struct EventSubscription {
    rx: broadcast::Receiver<StreamItem>,
    finished: CancellationToken,
}

impl EventSubscription {
    /// Next item, or `None` once the client has been closed.
    pub async fn next(&mut self) -> Option<StreamItem> {
        loop {
            match self.rx.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Lagged(missed)) => return Some(StreamItem::Gap { missed }),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {}
            }
            if self.finished.is_cancelled() {
                return None;
            }

            tokio::select! {
                biased;
                result = self.rx.recv() => {
                    return match result {
                        Ok(item) => Some(item),
                        Err(RecvError::Lagged(missed)) => Some(StreamItem::Gap { missed }),
                        Err(RecvError::Closed) => None,
                    };
                }
                _ = self.finished.cancelled() => {}
            }
        }
    }
}

struct ConnectionTask {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    tx: broadcast::Sender<StreamItem>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl ConnectionTask {
    async fn run(self) {
        let decode_warnings = LogThrottle::new(Duration::from_secs(5));
        // The first attempt, and the first after losing a working connection, are immediate.
        let mut delay = Duration::ZERO;
        let mut failures: u32 = 0;

        'reconnect: loop {
            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'reconnect,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break 'reconnect,
                result = self.connector.connect() => result,
            };
            let mut frames = match connected {
                Ok(frames) => frames,
                Err(e) => {
                    failures += 1;
                    delay = self.policy.next_delay(delay);
                    warn!(
                        error = %e,
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Push channel connect failed"
                    );
                    continue;
                }
            };

            failures = 0;
            info!("Push channel connected");
            let _ = self.tx.send(StreamItem::Connected);
            let connected_at = Instant::now();
            let mut delivered = false;

            let reason = loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'reconnect,
                    frame = frames.next() => match frame {
                        Some(Ok(text)) => {
                            delivered = true;
                            self.publish_frame(&text, &decode_warnings);
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "connection closed by server".to_string(),
                    },
                }
            };

            warn!(reason = %reason, "Push channel disconnected");
            let _ = self.tx.send(StreamItem::Disconnected { reason });
            // A connection that died before doing anything counts as a failed attempt.
            delay = if delivered || connected_at.elapsed() >= self.policy.initial {
                Duration::ZERO
            } else {
                self.policy.next_delay(delay)
            };
        }

        info!("Push channel closed");
        self.finished.cancel();
    }

    fn publish_frame(&self, text: &str, decode_warnings: &LogThrottle) {
        match Event::decode(text) {
            Ok(event) => {
                let _ = self.tx.send(StreamItem::Event(event));
            }
            Err(err) => {
                if decode_warnings.should_log() {
                    warn!(error = %err, "Dropping malformed push message");
                }
                let _ = self.tx.send(StreamItem::DecodeFailed(err));
            }
        }
    }
}
