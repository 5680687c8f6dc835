//! Connection handles and their outbound queues.
//!
//! A [`ConnectionHandle`] is the only thing other connections see of a
//! session: its owner, language, and the sending half of a bounded FIFO.
//! Every enqueue is bounded in time so a slow consumer can never stall the
//! connection that is routing to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use parley_shared::{OutboundEnvelope, UserId};

/// Result of trying to place an envelope on a connection's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// The queue stayed full for the whole wait; the envelope is lost.
    Dropped,
    /// The connection is shutting down.
    Closed,
}

pub struct ConnectionHandle {
    id: Uuid,
    user_id: UserId,
    lang: String,
    queue: mpsc::Sender<OutboundEnvelope>,
    /// Held exclusively while offline catch-up runs; live enqueues take it
    /// shared, so they queue up behind the replay.
    gate: Arc<RwLock<()>>,
    closed: watch::Sender<bool>,
    dropped: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(
        user_id: UserId,
        lang: String,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundEnvelope>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            lang,
            queue,
            gate: Arc::new(RwLock::new(())),
            closed,
            dropped: AtomicU64::new(0),
        });
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Envelopes dropped on this connection because its queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueue a router-driven envelope, waiting at most `wait` for room
    /// (and for any running catch-up to finish).
    pub async fn enqueue(&self, envelope: OutboundEnvelope, wait: Duration) -> EnqueueOutcome {
        if self.is_closed() {
            return EnqueueOutcome::Closed;
        }
        let send = async {
            let _open = self.gate.read().await;
            self.queue.send(envelope).await
        };
        self.settle(tokio::time::timeout(wait, send).await)
    }

    async fn push(&self, envelope: OutboundEnvelope, wait: Duration) -> EnqueueOutcome {
        if self.is_closed() {
            return EnqueueOutcome::Closed;
        }
        self.settle(tokio::time::timeout(wait, self.queue.send(envelope)).await)
    }

    fn settle<E>(
        &self,
        result: Result<Result<(), mpsc::error::SendError<E>>, tokio::time::error::Elapsed>,
    ) -> EnqueueOutcome {
        match result {
            Ok(Ok(())) => EnqueueOutcome::Queued,
            Ok(Err(_)) => EnqueueOutcome::Closed,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Dropped
            }
        }
    }

    /// Block live enqueues until the returned window is dropped.
    pub async fn open_catch_up(self: &Arc<Self>) -> CatchUpWindow {
        let gate = Arc::clone(&self.gate).write_owned().await;
        CatchUpWindow {
            handle: Arc::clone(self),
            _gate: gate,
        }
    }

    /// Signal both pipeline tasks to stop. Returns `false` if the handle was
    /// already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once [`ConnectionHandle::close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this only ends on close.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("lang", &self.lang)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Exclusive access to a connection's queue for offline catch-up.
pub struct CatchUpWindow {
    handle: Arc<ConnectionHandle>,
    _gate: OwnedRwLockWriteGuard<()>,
}

impl CatchUpWindow {
    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub async fn push(&self, envelope: OutboundEnvelope, wait: Duration) -> EnqueueOutcome {
        self.handle.push(envelope, wait).await
    }
}
