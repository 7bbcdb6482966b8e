//! In-process broadcast hub for live task updates
//!
//! The hub is a single actor task that owns the subscriber set. Handles
//! talk to it over an unbounded command channel, so neither registering nor
//! broadcasting ever waits on the actor or on a subscriber.
//!
//! Each subscriber gets a bounded queue. A broadcast offers the serialized
//! event to every queue with `try_send`; a full queue means the subscriber
//! is not keeping up, and it is evicted on the spot. Eviction drops the
//! hub's sender, which closes the queue once its buffered frames are read.
//!
//! [`Hub::close_all`] is final: the actor refuses every later registration by
//! dropping its sender on arrival, so a socket upgraded during shutdown closes
//! immediately instead of holding the server open.
//!
//! # Example
//!
//! ```rust,ignore
//! let hub = Hub::spawn(256);
//! let mut subscription = hub.register();
//! hub.broadcast(&HubEvent::task_update(&task));
//! let frame = subscription.queue.recv().await;
//! ```

pub mod subscriber;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

pub use subscriber::{run_subscriber, PumpConfig, PumpError};

use crate::models::{CrawlTask, CrawlTaskStatus};

/// Identifier assigned to each registered subscriber
pub type SubscriberId = u64;

// ============================================================================
// Events
// ============================================================================

/// Snapshot of a task pushed to dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: CrawlTaskStatus,
    pub progress: u8,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

/// Event envelope, serialized as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    TaskUpdate(TaskUpdate),
}

impl HubEvent {
    pub fn task_update(task: &CrawlTask) -> Self {
        Self::TaskUpdate(TaskUpdate {
            task_id: task.task_id.clone(),
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
            updated_at: task.updated_at,
        })
    }
}

// ============================================================================
// Hub
// ============================================================================

/// A registered subscriber's end of its bounded queue
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub queue: mpsc::Receiver<Utf8Bytes>,
}

enum Command {
    Register {
        id: SubscriberId,
        queue: mpsc::Sender<Utf8Bytes>,
    },
    Unregister(SubscriberId),
    Broadcast(Utf8Bytes),
    CloseAll,
    Count(oneshot::Sender<usize>),
}

/// Cloneable handle to the hub actor
///
/// The actor exits once every handle has been dropped.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    queue_capacity: usize,
}

impl Hub {
    /// Spawn the hub actor on the current tokio runtime
    pub fn spawn(queue_capacity: usize) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(receiver));

        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Admit a new subscriber.
    ///
    /// Broadcasts issued after this returns are delivered to the new queue.
    /// After [`close_all`](Self::close_all) the returned queue is already closed.
    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.send(Command::Register { id, queue: tx });
        Subscription { id, queue: rx }
    }

    /// Remove a subscriber and close its queue; unknown ids are ignored
    pub fn unregister(&self, id: SubscriberId) {
        self.send(Command::Unregister(id));
    }

    /// Serialize once and offer to every subscriber without blocking
    pub fn broadcast(&self, event: &HubEvent) {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Command::Broadcast(Utf8Bytes::from(json))),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize hub event"),
        }
    }

    /// Drop every subscriber, closing all queues, and refuse new ones
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.send(Command::CloseAll);
    }

    /// `close_all` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Count(tx));
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Hub actor has stopped, command dropped");
        }
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut subscribers: HashMap<SubscriberId, mpsc::Sender<Utf8Bytes>> = HashMap::new();
    let mut closed = false;

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { id, .. } if closed => {
                tracing::debug!(subscriber = id, "Hub closed, registration refused");
            }
            Command::Register { id, queue } => {
                subscribers.insert(id, queue);
                tracing::debug!(subscriber = id, total = subscribers.len(), "Subscriber registered");
            }
            Command::Unregister(id) => {
                if subscribers.remove(&id).is_some() {
                    tracing::debug!(subscriber = id, total = subscribers.len(), "Subscriber unregistered");
                }
            }
            Command::Broadcast(frame) => {
                subscribers.retain(|id, queue| match queue.try_send(frame.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(subscriber = *id, "Subscriber queue full, evicting");
                        crate::metrics::record_hub_eviction();
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
                crate::metrics::record_hub_broadcast();
            }
            Command::CloseAll => {
                if !subscribers.is_empty() {
                    tracing::info!(total = subscribers.len(), "Closing all subscribers");
                }
                subscribers.clear();
                closed = true;
            }
            Command::Count(reply) => {
                let _ = reply.send(subscribers.len());
            }
        }
        crate::metrics::set_hub_subscribers(subscribers.len());
    }

    tracing::debug!("Hub actor stopped");
}
