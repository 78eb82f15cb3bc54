//! Development-build replay log.
//!
//! When `QUIVER_REPLAY_DIR` is set in a debug build, every committed
//! event log is appended as JSON lines to a per-process file in that
//! directory. Release builds and unset environments get a no-op handle.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use quiver_core::MutationEvent;

/// Handle appended to by [`MutationPipeline::commit`]; cheap to clone.
///
/// Write failures are logged and swallowed, never failing a commit.
///
/// [`MutationPipeline::commit`]: crate::MutationPipeline::commit
#[derive(Clone, Default)]
pub struct ReplayRecorder {
    dir: Option<Arc<PathBuf>>,
}

impl ReplayRecorder {
    /// Recorder configured from `QUIVER_REPLAY_DIR`; disabled when the
    /// variable is unset or this is a release build.
    pub fn from_env() -> Self {
        if !cfg!(debug_assertions) {
            return Self::disabled();
        }
        match std::env::var_os("QUIVER_REPLAY_DIR") {
            Some(dir) if !dir.is_empty() => Self {
                dir: Some(Arc::new(PathBuf::from(dir))),
            },
            _ => Self::disabled(),
        }
    }

    /// A recorder that never writes.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Whether appends will write anywhere.
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Append one committed event log as JSON lines.
    pub fn append(&self, events: &[MutationEvent]) {
        let Some(dir) = &self.dir else {
            return;
        };
        if events.is_empty() {
            return;
        }
        if let Err(err) = write_lines(dir, events) {
            warn!(error = %err, "replay append failed");
        }
    }
}

fn write_lines(dir: &Path, events: &[MutationEvent]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("replay-{}.jsonl", std::process::id()));
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for event in events {
        let line = serde_json::to_vec(event)?;
        file.write_all(&line)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}
