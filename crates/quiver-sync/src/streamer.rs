//! Topic-keyed fan-out of mutation events to long-lived subscribers.
//!
//! A topic is `(entity kind, workspace)`. Each subscription owns a
//! bounded queue and a background delivery task; publication is a
//! non-blocking `try_send` per subscriber, so a stalled consumer can
//! never delay a commit. A subscriber whose queue is full is dropped as
//! lagging and must reconnect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quiver_core::{CoreError, ModelKind, MutationEvent, Uid};

const DEFAULT_QUEUE_SIZE: usize = 32;

/// Workspace-membership predicate consulted per event workspace.
///
/// The delivery task memoizes the answer per workspace, so the lookup
/// runs at most once per (subscription, workspace).
#[async_trait]
pub trait WorkspaceFilter: Send + Sync {
    /// Whether events of this workspace reach the subscriber.
    async fn allows(&self, workspace_id: &Uid) -> bool;
}

/// Transport the delivery task writes converted messages to.
///
/// An error return terminates the subscription.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Send one protocol message to the client.
    async fn send(&self, message: serde_json::Value) -> Result<(), CoreError>;
}

/// Batch-to-message converter. Receives a slice because queued batches
/// are coalesced before conversion.
pub type Converter = Box<dyn Fn(&[MutationEvent]) -> serde_json::Value + Send + Sync>;

struct Subscriber {
    id: u64,
    kinds: HashSet<ModelKind>,
    queue: mpsc::Sender<Vec<MutationEvent>>,
    cancel: CancellationToken,
}

/// Handle to a live subscription.
pub struct StreamHandle {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Subscription id, for diagnostics.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Terminate the subscription; the delivery task exits and the
    /// queue is dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the delivery task has exited (cancelled, sink failure,
    /// or dropped as lagging).
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the delivery task to exit.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

/// Topic-keyed publish/subscribe hub.
pub struct EventStreamer {
    queue_size: usize,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for EventStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}

impl EventStreamer {
    /// Hub with the given per-subscription queue capacity (in batches).
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size: queue_size.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live subscriptions, for tests and diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Register a subscription over the given entity kinds.
    ///
    /// Events pass `filter` per workspace (memoized), get coalesced into
    /// one batch when the consumer is behind, run through `converter`,
    /// and land in `sink`. Cancelling the returned handle (or the passed
    /// token) stops delivery; a sink error or a full queue does too.
    pub fn subscribe(
        &self,
        kinds: &[ModelKind],
        filter: Arc<dyn WorkspaceFilter>,
        converter: Converter,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> StreamHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue_tx, queue_rx) = mpsc::channel(self.queue_size);
        self.lock().push(Subscriber {
            id,
            kinds: kinds.iter().copied().collect(),
            queue: queue_tx,
            cancel: cancel.clone(),
        });
        debug!(subscription = id, kinds = kinds.len(), "stream attached");
        let task = tokio::spawn(run_delivery(id, queue_rx, filter, converter, sink, cancel.clone()));
        StreamHandle { id, cancel, task }
    }

    /// Remove a subscription by handle id.
    pub fn unsubscribe(&self, id: u64) {
        self.lock().retain(|sub| {
            if sub.id == id {
                sub.cancel.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Fan a committed event log out to every matching subscription.
    ///
    /// Never blocks: a full queue means the subscriber is lagging and is
    /// dropped on the spot.
    pub fn publish(&self, events: &[MutationEvent]) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.lock();
        subscribers.retain(|sub| {
            if sub.cancel.is_cancelled() {
                return false;
            }
            let batch: Vec<MutationEvent> = events
                .iter()
                .filter(|event| sub.kinds.contains(&event.kind))
                .cloned()
                .collect();
            if batch.is_empty() {
                return true;
            }
            match sub.queue.try_send(batch) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscription = sub.id, "subscriber lagging, dropping");
                    sub.cancel.cancel();
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

async fn run_delivery(
    id: u64,
    mut queue: mpsc::Receiver<Vec<MutationEvent>>,
    filter: Arc<dyn WorkspaceFilter>,
    converter: Converter,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    // Membership answers live for the life of the subscription.
    let mut memo: HashMap<Uid, bool> = HashMap::new();
    loop {
        let mut batch = tokio::select! {
            _ = cancel.cancelled() => break,
            received = queue.recv() => match received {
                Some(batch) => batch,
                None => break,
            },
        };
        // Coalesce whatever else is already queued.
        while let Ok(more) = queue.try_recv() {
            batch.extend(more);
        }
        let mut visible = Vec::with_capacity(batch.len());
        for event in batch {
            let allowed = match memo.get(&event.workspace_id) {
                Some(allowed) => *allowed,
                None => {
                    let allowed = filter.allows(&event.workspace_id).await;
                    memo.insert(event.workspace_id.clone(), allowed);
                    allowed
                }
            };
            if allowed {
                visible.push(event);
            }
        }
        if visible.is_empty() {
            continue;
        }
        let message = converter(&visible);
        // Sends race cancellation so a dropped-as-lagging subscription
        // cannot stay wedged inside a stalled transport.
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(message) => {
                if let Err(err) = sent {
                    debug!(subscription = id, error = %err, "sink failed, stream closed");
                    break;
                }
            }
        }
    }
    debug!(subscription = id, "delivery task exited");
}
