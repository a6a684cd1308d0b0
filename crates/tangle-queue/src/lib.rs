//! Durable in-process queue for asynchronous thread creation.
//!
//! The producer (an HTTP handler) publishes a serialized message and parks on
//! a oneshot waiter registered in a correlation table. One long-lived
//! consumer, started at process startup, drains the queue, persists each
//! message, and acknowledges it only after the row is durable. An unacked
//! delivery goes back on the queue, so delivery is at-least-once. The waiter
//! is resolved by correlation id once persistence completes; producers bound
//! their wait and treat a timeout as "accepted, still processing".

pub mod consumer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tangle_db::models::ThreadRow;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// The single named queue all thread-creation messages go through.
pub const THREAD_QUEUE: &str = "tangle_threads_queue";

/// A message is redelivered at most this many times before the consumer
/// gives up and fails the waiting producer.
pub const MAX_DELIVERIES: u32 = 3;

/// Wire format of a queued thread-creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub content: String,
    pub image: Vec<String>,
    pub user: Uuid,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,
    #[error("timed out waiting for the consumer")]
    Timeout,
    #[error("malformed message body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("persist failed: {0}")]
    Persist(String),
}

struct Delivered {
    correlation_id: Uuid,
    body: Vec<u8>,
    attempt: u32,
}

type Waiter = oneshot::Sender<Result<ThreadRow, QueueError>>;

struct QueueInner {
    tx: mpsc::UnboundedSender<Delivered>,
    /// Correlation table: request id -> the producer waiting on persistence.
    pending: RwLock<HashMap<Uuid, Waiter>>,
}

/// Producer-side handle. Cheap to clone; all clones publish to the same
/// queue and share the correlation table.
#[derive(Clone)]
pub struct ThreadQueue {
    inner: Arc<QueueInner>,
}

impl ThreadQueue {
    /// Build the queue. The returned receiver is handed to the single
    /// consumer task; the handle goes into app state.
    pub fn new() -> (ThreadQueue, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = ThreadQueue {
            inner: Arc::new(QueueInner {
                tx: tx.clone(),
                pending: RwLock::new(HashMap::new()),
            }),
        };
        let receiver = QueueReceiver { rx, requeue: tx };
        (queue, receiver)
    }

    /// Serialize and enqueue a message, registering a waiter under a fresh
    /// correlation id.
    pub async fn publish(&self, message: &QueueMessage) -> Result<PersistWaiter, QueueError> {
        let correlation_id = Uuid::new_v4();
        let body = serde_json::to_vec(message)?;

        let (done_tx, done_rx) = oneshot::channel();
        self.inner.pending.write().await.insert(correlation_id, done_tx);

        let envelope = Delivered {
            correlation_id,
            body,
            attempt: 1,
        };
        if self.inner.tx.send(envelope).is_err() {
            self.inner.pending.write().await.remove(&correlation_id);
            return Err(QueueError::Closed);
        }

        debug!(%correlation_id, queue = THREAD_QUEUE, "message enqueued");
        Ok(PersistWaiter {
            correlation_id,
            rx: done_rx,
            queue: self.clone(),
        })
    }

    /// Resolve the waiter registered under `correlation_id`, if it is still
    /// there. A producer that timed out has already deregistered itself.
    pub async fn complete(&self, correlation_id: Uuid, outcome: Result<ThreadRow, QueueError>) {
        match self.inner.pending.write().await.remove(&correlation_id) {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => debug!(%correlation_id, "no waiter for completed message"),
        }
    }

    async fn forget(&self, correlation_id: Uuid) {
        self.inner.pending.write().await.remove(&correlation_id);
    }

    /// Number of producers currently awaiting persistence.
    pub async fn pending_len(&self) -> usize {
        self.inner.pending.read().await.len()
    }
}

/// A producer's handle on one in-flight message.
pub struct PersistWaiter {
    correlation_id: Uuid,
    rx: oneshot::Receiver<Result<ThreadRow, QueueError>>,
    queue: ThreadQueue,
}

impl PersistWaiter {
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Wait until the consumer has persisted the message, bounded by
    /// `timeout`. On timeout the correlation entry is removed so a late
    /// completion is dropped instead of leaking.
    pub async fn wait(self, timeout: Duration) -> Result<ThreadRow, QueueError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(QueueError::Closed),
            Err(_) => {
                warn!(correlation_id = %self.correlation_id, "timed out awaiting persistence");
                self.queue.forget(self.correlation_id).await;
                Err(QueueError::Timeout)
            }
        }
    }
}

/// Consumer side. Exactly one exists per queue.
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Delivered>,
    requeue: mpsc::UnboundedSender<Delivered>,
}

impl QueueReceiver {
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await.map(|envelope| Delivery {
            envelope: Some(envelope),
            requeue: self.requeue.clone(),
        })
    }
}

/// One delivered message. Must be explicitly acknowledged once processing is
/// durable; a `Delivery` dropped without `ack` is requeued.
pub struct Delivery {
    envelope: Option<Delivered>,
    requeue: mpsc::UnboundedSender<Delivered>,
}

impl Delivery {
    pub fn correlation_id(&self) -> Uuid {
        self.envelope.as_ref().expect("delivery already settled").correlation_id
    }

    pub fn attempt(&self) -> u32 {
        self.envelope.as_ref().expect("delivery already settled").attempt
    }

    pub fn body(&self) -> &[u8] {
        &self.envelope.as_ref().expect("delivery already settled").body
    }

    /// Decode the JSON message body.
    pub fn message(&self) -> Result<QueueMessage, QueueError> {
        Ok(serde_json::from_slice(self.body())?)
    }

    /// Acknowledge the message: it is done and will not be redelivered.
    pub fn ack(mut self) {
        self.envelope = None;
    }

    /// Reject the message and put it back on the queue.
    pub fn nack(self) {
        // Drop handles the requeue.
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        let Some(mut envelope) = self.envelope.take() else {
            return;
        };
        envelope.attempt += 1;
        if envelope.attempt > MAX_DELIVERIES {
            error!(
                correlation_id = %envelope.correlation_id,
                "dropping message after {} deliveries",
                MAX_DELIVERIES
            );
            return;
        }
        let correlation_id = envelope.correlation_id;
        if self.requeue.send(envelope).is_err() {
            warn!(%correlation_id, "queue closed, message lost on requeue");
        } else {
            debug!(%correlation_id, "unacked delivery requeued");
        }
    }
}
