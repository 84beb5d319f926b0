//! Robot sessions: the registry of live connections, role-addressed sends,
//! and the WebSocket endpoint that feeds them.

mod endpoint;
mod messenger;
mod registry;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use endpoint::SessionEndpoint;
pub use messenger::RoleSender;
pub use registry::{HelloOutcome, Session, SessionRegistry};

/// Outbound queue depth per session before sends start failing.
const LINK_CAPACITY: usize = 64;

/// Transport-assigned session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        SessionId(id.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Text(Arc<str>),
    Close,
}

/// Host-side handle to one connection's writer.
#[derive(Debug, Clone)]
pub struct SessionLink {
    tx: mpsc::Sender<LinkMessage>,
}

impl SessionLink {
    pub fn new() -> (Self, mpsc::Receiver<LinkMessage>) {
        let (tx, rx) = mpsc::channel(LINK_CAPACITY);
        (Self { tx }, rx)
    }

    /// Returns `false` if the connection is gone or its queue is full.
    pub fn send_text(&self, text: Arc<str>) -> bool {
        self.tx.try_send(LinkMessage::Text(text)).is_ok()
    }

    /// Asks the connection to close. Closing an already-closed link is a no-op.
    pub fn close(&self) {
        let _ = self.tx.try_send(LinkMessage::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
