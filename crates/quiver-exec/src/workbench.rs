//! Process-wide state the serving layer holds onto.

use std::sync::Arc;

use quiver_core::CoreError;
use quiver_store::Store;
use quiver_sync::{EventStreamer, MutationPipeline, ReplayRecorder};

use crate::config::ExecutorConfig;
use crate::executor::RequestExecutor;

/// Default per-subscription queue depth for the shared streamer.
const STREAM_QUEUE_SIZE: usize = 32;

/// Everything a serving process shares across calls: the storage
/// gateway, one streamer, the replay recorder and the executor config.
/// Pipelines and executors are constructed per call from here.
#[derive(Clone)]
pub struct Workbench {
    store: Store,
    streamer: Arc<EventStreamer>,
    recorder: ReplayRecorder,
    config: ExecutorConfig,
}

impl Workbench {
    /// Build shared state over an already-connected store. The replay
    /// recorder arms itself from the environment in debug builds.
    pub fn new(store: Store, config: ExecutorConfig) -> Self {
        Self {
            store,
            streamer: Arc::new(EventStreamer::new(STREAM_QUEUE_SIZE)),
            recorder: ReplayRecorder::from_env(),
            config,
        }
    }

    /// The storage gateway.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The shared event streamer, for stream subscriptions.
    pub fn streamer(&self) -> &Arc<EventStreamer> {
        &self.streamer
    }

    /// A fresh mutation pipeline wired to the shared streamer and
    /// recorder.
    pub fn pipeline(&self) -> MutationPipeline {
        MutationPipeline::new(
            self.store.clone(),
            Some(self.streamer.clone()),
            Some(self.recorder.clone()),
        )
    }

    /// A fresh request executor wired to the shared streamer and
    /// recorder.
    pub fn executor(&self) -> Result<RequestExecutor, CoreError> {
        RequestExecutor::new(
            self.store.clone(),
            Some(self.streamer.clone()),
            Some(self.recorder.clone()),
            self.config.clone(),
        )
    }
}
