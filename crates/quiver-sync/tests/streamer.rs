//! Fan-out behavior: ordering, membership memoization, and the
//! lagging-subscriber drop policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quiver_core::{CoreError, ModelKind, MutationEvent, Op, Uid};
use quiver_sync::{EventSink, EventStreamer, WorkspaceFilter};

struct AllowAll;

#[async_trait]
impl WorkspaceFilter for AllowAll {
    async fn allows(&self, _workspace_id: &Uid) -> bool {
        true
    }
}

/// Counts lookups so tests can assert memoization.
struct CountingFilter {
    lookups: AtomicUsize,
    allow: bool,
}

#[async_trait]
impl WorkspaceFilter for CountingFilter {
    async fn allows(&self, _workspace_id: &Uid) -> bool {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.allow
    }
}

/// Forwards every message into an unbounded channel.
struct ChannelSink {
    tx: mpsc::UnboundedSender<serde_json::Value>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, message: serde_json::Value) -> Result<(), CoreError> {
        self.tx
            .send(message)
            .map_err(|_| CoreError::Internal("receiver gone".to_string()))
    }
}

/// Never completes a send; models a client that stopped reading.
struct StuckSink;

#[async_trait]
impl EventSink for StuckSink {
    async fn send(&self, _message: serde_json::Value) -> Result<(), CoreError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn streamer(queue_size: usize) -> EventStreamer {
    use tracing_subscriber::{fmt, EnvFilter};
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    EventStreamer::new(queue_size)
}

fn event(kind: ModelKind, workspace_id: &Uid) -> MutationEvent {
    MutationEvent {
        kind,
        op: Op::Insert,
        workspace_id: workspace_id.clone(),
        model_id: Uid::generate(),
        parent_id: None,
        is_delta: false,
        payload: json!({}),
        patch: None,
    }
}

fn id_converter(events: &[MutationEvent]) -> serde_json::Value {
    json!(events
        .iter()
        .map(|e| e.model_id.as_str().to_string())
        .collect::<Vec<_>>())
}

#[tokio::test]
async fn test_subscriber_receives_matching_kinds_in_order() {
    let streamer = streamer(8);
    let ws = Uid::generate();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = streamer.subscribe(
        &[ModelKind::HttpRequest],
        Arc::new(AllowAll),
        Box::new(id_converter),
        Arc::new(ChannelSink { tx }),
        CancellationToken::new(),
    );

    let wanted = event(ModelKind::HttpRequest, &ws);
    let ignored = event(ModelKind::Tag, &ws);
    streamer.publish(&[ignored.clone(), wanted.clone()]);
    streamer.publish(&[event(ModelKind::Tag, &ws)]);

    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message, json!([wanted.model_id.as_str()]));
    // The tag-only publication produced nothing for this subscriber.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_membership_lookup_memoized_per_workspace() {
    let streamer = streamer(8);
    let ws = Uid::generate();
    let filter = Arc::new(CountingFilter {
        lookups: AtomicUsize::new(0),
        allow: true,
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = streamer.subscribe(
        &[ModelKind::Tag],
        filter.clone(),
        Box::new(id_converter),
        Arc::new(ChannelSink { tx }),
        CancellationToken::new(),
    );

    for _ in 0..5 {
        streamer.publish(&[event(ModelKind::Tag, &ws)]);
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(filter.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_member_workspace_events_filtered_out() {
    let streamer = streamer(8);
    let ws = Uid::generate();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = streamer.subscribe(
        &[ModelKind::Tag],
        Arc::new(CountingFilter {
            lookups: AtomicUsize::new(0),
            allow: false,
        }),
        Box::new(id_converter),
        Arc::new(ChannelSink { tx }),
        CancellationToken::new(),
    );

    streamer.publish(&[event(ModelKind::Tag, &ws)]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert!(!handle.is_closed());
}

#[tokio::test]
async fn test_cancellation_stops_delivery() {
    let streamer = streamer(8);
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let handle = streamer.subscribe(
        &[ModelKind::Tag],
        Arc::new(AllowAll),
        Box::new(id_converter),
        Arc::new(ChannelSink { tx }),
        cancel.clone(),
    );

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle.closed())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_slow_subscriber_dropped_others_unaffected() {
    let queue_size = 4;
    let streamer = streamer(queue_size);
    let ws = Uid::generate();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let _handle_a = streamer.subscribe(
        &[ModelKind::HttpRequest],
        Arc::new(AllowAll),
        Box::new(id_converter),
        Arc::new(ChannelSink { tx: tx_a }),
        CancellationToken::new(),
    );
    let handle_b = streamer.subscribe(
        &[ModelKind::HttpRequest],
        Arc::new(AllowAll),
        Box::new(id_converter),
        Arc::new(StuckSink),
        CancellationToken::new(),
    );
    assert_eq!(streamer.subscriber_count(), 2);

    // B's delivery task takes one batch off the queue and wedges in its
    // sink, so the queue needs queue_size + 2 publications to overflow.
    let total = queue_size + 2;
    let mut published = Vec::new();
    let started = Instant::now();
    for _ in 0..total {
        let e = event(ModelKind::HttpRequest, &ws);
        published.push(e.model_id.as_str().to_string());
        streamer.publish(std::slice::from_ref(&e));
        tokio::task::yield_now().await;
    }
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "publishing must not wait on the stuck subscriber"
    );

    // A drains everything, in order, possibly coalesced.
    let mut received = Vec::new();
    while received.len() < total {
        let message = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        for id in message.as_array().unwrap() {
            received.push(id.as_str().unwrap().to_string());
        }
    }
    assert_eq!(received, published);

    // B was dropped as lagging and its task exited.
    tokio::time::timeout(Duration::from_secs(1), handle_b.closed())
        .await
        .unwrap();
    assert_eq!(streamer.subscriber_count(), 1);
}
