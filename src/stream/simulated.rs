use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::Notify;

use super::connector::{Connector, FrameStream};
use crate::error::TransportError;

/// One scripted connection attempt.
#[derive(Debug, Clone)]
pub enum ScriptedSession {
    /// Accept, deliver the frames, then drop the connection.
    Deliver(Vec<String>),
    /// Accept, deliver the frames, then stay open and silent.
    DeliverAndHold(Vec<String>),
    /// Accept, deliver the frames, then fail with a receive error.
    DeliverThenFail(Vec<String>, String),
    /// Refuse the connection.
    Refuse(String),
}

struct Script {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    attempts: AtomicUsize,
    more: Notify,
}

/// A connector that plays back scripted sessions instead of opening a socket.
///
/// When the script runs out, `connect()` waits until more sessions are pushed
/// through the [`ScriptHandle`].
pub struct ScriptedConnector {
    script: Arc<Script>,
}

/// Test-side control for a [`ScriptedConnector`].
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub fn new(sessions: Vec<ScriptedSession>) -> (Self, ScriptHandle) {
        let script = Arc::new(Script {
            sessions: Mutex::new(sessions.into()),
            attempts: AtomicUsize::new(0),
            more: Notify::new(),
        });
        (
            Self {
                script: script.clone(),
            },
            ScriptHandle { script },
        )
    }
}

impl ScriptHandle {
    pub fn push(&self, session: ScriptedSession) {
        self.script
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(session);
        self.script.more.notify_one();
    }

    /// Number of connection attempts served so far.
    pub fn attempts(&self) -> usize {
        self.script.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        let session = loop {
            let next = self
                .script
                .sessions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            match next {
                Some(session) => break session,
                None => self.script.more.notified().await,
            }
        };
        self.script.attempts.fetch_add(1, Ordering::SeqCst);

        let frames = |lines: Vec<String>| stream::iter(lines.into_iter().map(Ok));
        Ok(match session {
            ScriptedSession::Deliver(lines) => frames(lines).boxed(),
            ScriptedSession::DeliverAndHold(lines) => {
                frames(lines).chain(stream::pending()).boxed()
            }
            ScriptedSession::DeliverThenFail(lines, reason) => frames(lines)
                .chain(stream::once(async move {
                    Err(TransportError::Receive(reason))
                }))
                .boxed(),
            ScriptedSession::Refuse(reason) => {
                return Err(TransportError::Connect {
                    url: "scripted://".to_string(),
                    message: reason,
                });
            }
        })
    }
}
