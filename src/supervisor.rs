//! The shard supervisor: drives one shard's lines through one executor
//! process, guaranteeing forward progress even when the executor hangs.
//!
//! Tasks are strictly sequential within a shard: one outstanding dispatch
//! at a time, resolved in input order. Throughput comes from running many
//! shards concurrently (see [`crate::coordinator`]), not from pipelining
//! inside one. Every shard input line yields exactly one output envelope:
//! the real result, or a synthetic error record when the deadline expired
//! or the executor died mid-task.

use crate::config::DEFAULT_TASK_TIMEOUT;
use crate::executor::{ExecutorHandle, ExecutorSpec};
use crate::io::lines::{line_reader, line_writer};
use crate::record::{Envelope, Record};
use crate::wire::ResultMsg;
use anyhow::{Context, Result, bail};
use crossbeam_channel::RecvTimeoutError;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Counters for one completed shard run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Lines read from the shard input (== envelopes written).
    pub lines: u64,
    /// Tasks that missed their deadline.
    pub timeouts: u64,
    /// Executors that died before returning a result.
    pub crashes: u64,
}

impl ShardStats {
    /// Executor replacements performed during the run.
    pub fn restarts(&self) -> u64 {
        self.timeouts + self.crashes
    }
}

pub struct ShardSupervisor {
    spec: ExecutorSpec,
    timeout: Duration,
}

impl ShardSupervisor {
    pub fn new(spec: ExecutorSpec) -> Self {
        Self {
            spec,
            timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Process every line of `shard_in` into `shard_out`.
    ///
    /// Per task: dispatch, then wait at most the configured deadline. A
    /// missing result forcibly terminates the executor (it is presumed
    /// non-responsive), substitutes a synthetic error envelope, and spawns
    /// a replacement, re-paying its initialization, before the next
    /// line. After the last line a stop message is sent and the executor
    /// is awaited without bound.
    pub fn run(&self, shard_in: &Path, shard_out: &Path) -> Result<ShardStats> {
        let reader = line_reader(shard_in)?;
        let mut writer = line_writer(shard_out)?;
        let mut exec = ExecutorHandle::spawn(&self.spec)?;
        let mut stats = ShardStats::default();

        for (seq, line) in reader.lines().enumerate() {
            let seq = seq as u64;
            let line = line.with_context(|| {
                format!("read line {} in {}", seq + 1, shard_in.display())
            })?;
            let record: Record = serde_json::from_str(&line).with_context(|| {
                format!("parse line {} in {}", seq + 1, shard_in.display())
            })?;

            // Dispatched: task on the channel, deadline armed. A write
            // failure means the executor is already dead; the result
            // channel reports that as a disconnect below.
            exec.dispatch(seq, &record).ok();

            let (envelope, restart) = match exec.recv_timeout(self.timeout) {
                Ok(ResultMsg::Done { seq: got, out }) => {
                    if got != seq {
                        bail!("result out of order: expected seq {seq}, got {got}");
                    }
                    (Envelope::new(record, out), false)
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        seq,
                        pid = exec.pid(),
                        timeout_secs = self.timeout.as_secs_f64(),
                        "task deadline expired; replacing executor"
                    );
                    stats.timeouts += 1;
                    exec.kill();
                    (Envelope::deadline_expired(record, self.timeout), true)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Not slow, dead. Same recovery, its own log line.
                    warn!(
                        seq,
                        pid = exec.pid(),
                        "executor exited before returning a result; replacing it"
                    );
                    stats.crashes += 1;
                    exec.kill();
                    (
                        Envelope::error(record, "Executor exited before returning a result."),
                        true,
                    )
                }
            };

            serde_json::to_writer(&mut writer, &envelope)
                .with_context(|| format!("serialize envelope {} to {}", seq, shard_out.display()))?;
            writer.write_all(b"\n")?;
            stats.lines += 1;

            if restart {
                exec = ExecutorHandle::spawn(&self.spec)?;
            }
        }

        let status = exec.stop()?;
        if !status.success() {
            warn!(%status, "executor exited abnormally during shutdown");
        }
        writer.flush().context("flush shard output")?;
        drop(writer);

        info!(
            shard_in = %shard_in.display(),
            lines = stats.lines,
            timeouts = stats.timeouts,
            crashes = stats.crashes,
            "shard complete"
        );
        Ok(stats)
    }
}
