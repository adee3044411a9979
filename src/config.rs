//! The pipeline's configuration surface.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deadline applied to each dispatched task unless overridden.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between completion polls in the coordinator.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a full pipeline run needs.
///
/// `parallelism` is the shard count K; `0` selects single-threaded mode,
/// which transforms every line synchronously in the calling process with
/// no executor processes and no deadline enforcement.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Scratch directory for shard inputs/outputs; cleared per run.
    pub work_dir: PathBuf,
    pub parallelism: usize,
    pub task_timeout: Duration,
    /// Registry name of the per-record transform.
    pub transform: String,
    /// Forwarded opaquely into the transform.
    pub liftover: bool,
    /// Leave shard files behind after the merge, for inspection.
    pub keep_shards: bool,
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let output: PathBuf = output.into();
        let work_dir = output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("shards");
        Self {
            input: input.into(),
            output,
            work_dir,
            parallelism: 1,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            transform: "identity".to_string(),
            liftover: false,
            keep_shards: false,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_transform(mut self, name: impl Into<String>) -> Self {
        self.transform = name.into();
        self
    }

    pub fn with_liftover(mut self, liftover: bool) -> Self {
        self.liftover = liftover;
        self
    }

    pub fn with_keep_shards(mut self, keep: bool) -> Self {
        self.keep_shards = keep;
        self
    }
}
