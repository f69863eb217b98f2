//! Consumer sessions
//!
//! A [`ClientSession`] is the registry-side end of one consumer connection:
//! a bounded queue feeding that connection's socket writer plus an open flag.
//! The connection task keeps a [`SessionHandle`] to the same flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A serialized JSON text frame, shared by every session queue
pub type Frame = Arc<str>;

/// Unique identifier for a consumer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be handed to a session
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The consumer is not keeping up and its queue is full
    #[error("session queue is full")]
    Full,

    /// The session was closed or its writer has gone away
    #[error("session is closed")]
    Closed,
}

/// Registry-side state of one consumer connection
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    sender: mpsc::Sender<Frame>,
    open: Arc<AtomicBool>,
}

impl ClientSession {
    /// Create a session and the handle its connection task keeps
    pub fn new(sender: mpsc::Sender<Frame>) -> (Self, SessionHandle) {
        let id = SessionId::new();
        let open = Arc::new(AtomicBool::new(true));
        let handle = SessionHandle {
            id,
            open: Arc::clone(&open),
        };
        let session = Self { id, sender, open };
        (session, handle)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Enqueue a frame without waiting
    pub fn try_send(&self, frame: &Frame) -> Result<(), SendFailure> {
        if !self.is_open() {
            return Err(SendFailure::Closed);
        }

        self.sender
            .try_send(Arc::clone(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendFailure::Full,
                mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
            })
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Handle held by the connection task that owns the socket
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    open: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// False once the registry has evicted or closed the session
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
