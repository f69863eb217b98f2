//! Client Registry
//!
//! Tracks every connected consumer session. This is the only structure shared
//! between connection tasks; it is guarded by a tokio `RwLock`.
//!
//! Broadcasts hold the read lock for the whole pass. Sessions whose send fails
//! are marked closed during the pass and swept under the write lock once the
//! pass is over, so the map is never mutated while it is being iterated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use super::session::{ClientSession, Frame, SendFailure, SessionHandle, SessionId};

/// Registry limits
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of concurrent consumer sessions
    pub max_sessions: usize,
    /// Capacity of each session's outbound queue, at least 1
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            queue_capacity: 64,
        }
    }
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions a send was attempted on
    pub attempted: usize,
    /// Sends that succeeded
    pub delivered: usize,
    /// Sessions removed because their send failed
    pub evicted: usize,
}

impl BroadcastReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Registry of open consumer sessions
#[derive(Debug)]
pub struct ClientRegistry {
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
    config: RegistryConfig,
    /// Set by `close_all`; no session registers afterwards
    closed: AtomicBool,
}

impl ClientRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Capacity to use when creating a session queue
    pub fn queue_capacity(&self) -> usize {
        // mpsc::channel panics on zero
        self.config.queue_capacity.max(1)
    }

    /// Register a new consumer session
    ///
    /// Returns the session handle, or an error if the session limit has been
    /// reached or the registry has been closed.
    pub async fn register(
        &self,
        sender: mpsc::Sender<Frame>,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.write().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        if sessions.len() >= self.config.max_sessions {
            return Err(RegistryError::TooManySessions {
                max: self.config.max_sessions,
            });
        }

        let (session, handle) = ClientSession::new(sender);
        sessions.insert(session.id(), session);

        tracing::info!(session_id = %handle.id(), sessions = sessions.len(), "Consumer session registered");
        Ok(handle)
    }

    /// Remove a session. Returns false if it was already gone.
    pub async fn unregister(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.mark_closed();
                tracing::info!(session_id = %id, "Consumer session unregistered");
                true
            }
            None => false,
        }
    }

    /// Apply `f` to every open session
    ///
    /// A failure on one session never stops the pass; failed sessions are
    /// evicted after it completes.
    pub async fn for_each_open<F>(&self, mut f: F) -> BroadcastReport
    where
        F: FnMut(&ClientSession) -> Result<(), SendFailure>,
    {
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for session in sessions.values().filter(|s| s.is_open()) {
                report.attempted += 1;
                match f(session) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        session.mark_closed();
                        tracing::warn!(
                            session_id = %session.id(),
                            error = %e,
                            "Dropping consumer session after send failure"
                        );
                        failed.push(session.id());
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in failed {
                if sessions.remove(&id).is_some() {
                    report.evicted += 1;
                }
            }
        }

        report
    }

    /// Enqueue a frame on every open session without blocking
    pub async fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        let report = self.for_each_open(|session| session.try_send(frame)).await;

        if report.attempted > 0 {
            tracing::trace!(
                attempted = report.attempted,
                delivered = report.delivered,
                "Broadcast frame"
            );
        }
        report
    }

    /// Close and drop every session, and refuse new ones from now on
    ///
    /// Dropping the senders lets each session writer drain what is already
    /// queued and then close its socket.
    pub async fn close_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.closed.store(true, Ordering::Release);
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.mark_closed();
        }
        if count > 0 {
            tracing::info!(sessions = count, "Closed all consumer sessions");
        }
        count
    }

    /// Get the current session count
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Errors that can occur in the client registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Too many consumer sessions (limit: {max})")]
    TooManySessions { max: usize },

    #[error("Relay is shutting down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(text: &str) -> Frame {
        Arc::from(text)
    }

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_sessions, 1000);
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_queue_capacity_is_never_zero() {
        let registry = ClientRegistry::new(RegistryConfig {
            max_sessions: 1,
            queue_capacity: 0,
        });
        assert_eq!(registry.queue_capacity(), 1);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = ClientRegistry::default();
        let (tx, _rx) = mpsc::channel(4);

        let handle = registry.register(tx).await.unwrap();
        assert_eq!(registry.len().await, 1);

        assert!(registry.unregister(&handle.id()).await);
        assert!(!handle.is_open());
        assert!(registry.is_empty().await);

        // Idempotent
        assert!(!registry.unregister(&handle.id()).await);
    }

    #[tokio::test]
    async fn test_session_limit() {
        let registry = ClientRegistry::new(RegistryConfig {
            max_sessions: 2,
            queue_capacity: 4,
        });

        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let (tx3, _rx3) = mpsc::channel(4);

        registry.register(tx1).await.unwrap();
        registry.register(tx2).await.unwrap();
        let result = registry.register(tx3).await;

        assert_eq!(result.unwrap_err(), RegistryError::TooManySessions { max: 2 });
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let registry = ClientRegistry::default();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (tx, rx) = mpsc::channel(4);
            registry.register(tx).await.unwrap();
            receivers.push(rx);
        }

        let report = registry.broadcast(&frame("{\"n\":1}")).await;
        assert_eq!(
            report,
            BroadcastReport {
                attempted: 5,
                delivered: 5,
                evicted: 0
            }
        );
        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap().as_ref(), "{\"n\":1}");
        }
    }

    #[tokio::test]
    async fn test_failed_session_does_not_block_others() {
        let registry = ClientRegistry::default();
        let mut healthy = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(4);
            registry.register(tx).await.unwrap();
            healthy.push(rx);
        }
        let (tx, dead_rx) = mpsc::channel(4);
        let dead = registry.register(tx).await.unwrap();
        drop(dead_rx);

        let report = registry.broadcast(&frame("x")).await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.evicted, 1);
        assert!(!dead.is_open());
        assert_eq!(registry.len().await, 3);

        for rx in healthy.iter_mut() {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn test_for_each_open_counts_every_attempt() {
        let registry = ClientRegistry::default();
        let mut keep = Vec::new();
        for _ in 0..4 {
            let (tx, rx) = mpsc::channel(1);
            registry.register(tx).await.unwrap();
            keep.push(rx);
        }

        let mut calls = 0;
        let report = registry
            .for_each_open(|_| {
                calls += 1;
                if calls == 2 {
                    Err(SendFailure::Closed)
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls, 4);
        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 3);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_evicted() {
        let registry = ClientRegistry::default();
        let (tx, _rx) = mpsc::channel(1);
        let handle = registry.register(tx).await.unwrap();

        assert_eq!(registry.broadcast(&frame("1")).await.delivered, 1);
        let report = registry.broadcast(&frame("2")).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.evicted, 1);
        assert!(!handle.is_open());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_sessions() {
        let registry = ClientRegistry::default();
        assert_eq!(registry.broadcast(&frame("x")).await, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_close_all_drops_senders() {
        let registry = ClientRegistry::default();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = registry.register(tx).await.unwrap();
        registry.broadcast(&frame("last")).await;

        assert_eq!(registry.close_all().await, 1);
        assert!(!handle.is_open());

        // Queued frame still drains, then the channel reports closed
        assert_eq!(rx.recv().await.unwrap().as_ref(), "last");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_register_after_close_all_is_refused() {
        let registry = ClientRegistry::default();
        registry.close_all().await;

        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(registry.register(tx).await.unwrap_err(), RegistryError::Closed);
        assert!(registry.is_empty().await);
        // The rejected sender is dropped, so a writer would finish at once
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_register_and_broadcast() {
        let registry = Arc::new(ClientRegistry::default());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (tx, rx) = mpsc::channel(64);
                let handle = registry.register(tx).await.unwrap();
                registry.broadcast(&Arc::from("tick")).await;
                registry.unregister(&handle.id()).await;
                rx
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty().await);
    }
}
