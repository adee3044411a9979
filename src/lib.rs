//! # Shardpipe
//!
//! A **partitioned, timeout-supervised conversion pipeline** for large
//! line-oriented compressed record files. Shardpipe reads gzip NDJSON,
//! applies an opaque per-record transform, and writes one envelope per
//! input record, `{"in": <original>, "out": <result>}`, without ever
//! losing a line to a hung or crashed worker.
//!
//! ## How a run works
//!
//! 1. The input is split into K shard files by round-robin line
//!    assignment ([`partition::split_lines`]).
//! 2. One **shard supervisor** per shard runs as its own OS process,
//!    owning one long-lived **executor process** that performs the
//!    transform ([`supervisor::ShardSupervisor`], [`executor`]).
//! 3. Each task gets a deadline. An executor that misses it is killed
//!    outright, a synthetic error envelope takes the result's place, and
//!    a fresh executor is spawned before the next line.
//! 4. When all shards finish, their outputs are concatenated in shard
//!    order into the final file ([`partition::merge_shards`]).
//!
//! ```no_run
//! use shardpipe::{RunConfig, coordinator};
//! use std::time::Duration;
//! # fn main() -> anyhow::Result<()> {
//!
//! let cfg = RunConfig::new("records.ndjson.gz", "out/records.ndjson.gz")
//!     .with_parallelism(4)
//!     .with_task_timeout(Duration::from_secs(10));
//! let summary = coordinator::run(&cfg)?;
//! println!("{} records converted across {} shards", summary.lines, summary.shards);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - **No loss**: every input line produces exactly one output envelope,
//!   even under a transform that always fails or never returns.
//! - **Shard-major output order**: all of shard 0's results precede all of
//!   shard 1's. With round-robin assignment this is *not* the input
//!   order; it is the documented contract of the merge.
//! - **Within a shard**: strictly sequential, one outstanding task at a
//!   time, resolved in input order.
//! - **Failure containment**: per-record errors are data
//!   (`{"errors": ...}` results), never run failures. Infrastructure
//!   errors (partition or merge I/O, supervisor crashes) abort the run.
//!
//! ## Why processes
//!
//! Transforms may call into native or blocking code that cannot be
//! interrupted cooperatively. Process termination is the only cancellation
//! that is guaranteed to stick, so the executor (the unit that runs the
//! transform) is an OS process, replaceable without disturbing its
//! supervisor or sibling shards.
//!
//! ## Transforms
//!
//! A transform is resolved by name from a global registry and built once
//! per executor process; see [`transform::TransformFactory`]. It must
//! encode its own failures as `{"errors": <message>}` values; nothing it
//! returns can abort the pipeline.
//!
//! ## The generalized pool
//!
//! [`pool::WorkerPool`] is the same executor contract behind a reusable
//! interface: N workers, one bounded task queue, one result queue,
//! monotonic task ids, and an in-flight view for liveness monitoring,
//! with no automatic deadline action.
//!
//! ## Module overview
//!
//! - [`record`] - records and result envelopes
//! - [`partition`] - round-robin split and shard-major merge
//! - [`transform`] - the per-record transform interface and registry
//! - [`wire`] - the task/result channel protocol
//! - [`executor`] - the executor process, both sides of it
//! - [`supervisor`] - per-shard deadline enforcement and restart policy
//! - [`coordinator`] - fan-out/fan-in across shards, single-threaded mode
//! - [`pool`] - the generalized worker pool
//! - [`io`] - compression-transparent line I/O and storage interfaces
//! - [`config`] - the run configuration surface
//! - [`progress`] - rate-limited progress reporting

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod io;
pub mod partition;
pub mod pool;
pub mod progress;
pub mod record;
pub mod supervisor;
pub mod transform;
pub mod wire;

// General re-exports
pub use config::{DEFAULT_TASK_TIMEOUT, RunConfig};
pub use coordinator::{RunSummary, run};
pub use executor::{ExecutorHandle, ExecutorSpec};
pub use partition::{PartitionSet, merge_shards, split_lines};
pub use pool::{TaskId, WorkerPool};
pub use record::{Envelope, Record};
pub use supervisor::{ShardStats, ShardSupervisor};
pub use transform::{
    Transform, TransformConfig, TransformFactory, register_transform, resolve_transform,
};
