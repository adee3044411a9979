//! The pool coordinator: fans out one shard supervisor per shard as its
//! own OS process, waits for all of them, and reassembles the output.
//!
//! OS processes, not threads, on purpose: a hung unit of work must be
//! killable without touching its siblings or this process. Shards share
//! nothing but the filesystem paths they are handed.
//!
//! `parallelism == 0` degenerates to single-threaded mode: no partitioning,
//! no subprocesses, no deadline; every line is converted synchronously in
//! the calling process. Debug/low-volume use; a strict behavioral subset.

use crate::config::{POLL_INTERVAL, RunConfig};
use crate::io::lines::{line_reader, line_writer};
use crate::partition::{merge_shards, shard_output_path, split_lines};
use crate::progress::ProgressLogger;
use crate::record::Record;
use crate::transform::{TransformConfig, convert, resolve_transform};
use anyhow::{Context, Result, bail};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Envelopes in the final output.
    pub lines: u64,
    /// Shards run; 0 in single-threaded mode.
    pub shards: usize,
}

/// Execute a full conversion run per `cfg`.
///
/// Embedded per-record errors never fail a run; only infrastructure
/// failures (partitioning, supervisor crashes, merge I/O) do.
pub fn run(cfg: &RunConfig) -> Result<RunSummary> {
    if cfg.parallelism == 0 {
        run_single(cfg)
    } else {
        run_sharded(cfg)
    }
}

fn run_single(cfg: &RunConfig) -> Result<RunSummary> {
    let tcfg = TransformConfig {
        liftover: cfg.liftover,
    };
    let mut transform = resolve_transform(&cfg.transform, &tcfg)?;
    let reader = line_reader(&cfg.input)?;
    let mut writer = line_writer(&cfg.output)?;

    let mut progress = ProgressLogger::new("convert", None, Duration::from_secs(10));
    let mut lines = 0u64;
    for (i, line) in reader.lines().enumerate() {
        let line =
            line.with_context(|| format!("read line {} in {}", i + 1, cfg.input.display()))?;
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("parse line {} in {}", i + 1, cfg.input.display()))?;
        let envelope = convert(record, transform.as_mut());
        serde_json::to_writer(&mut writer, &envelope)
            .with_context(|| format!("write {}", cfg.output.display()))?;
        writer.write_all(b"\n")?;
        lines += 1;
        progress.update(lines);
    }
    writer.flush().context("flush output")?;
    drop(writer);

    progress.finish(lines);
    info!(output = %cfg.output.display(), lines, "single-threaded run complete");
    Ok(RunSummary { lines, shards: 0 })
}

fn run_sharded(cfg: &RunConfig) -> Result<RunSummary> {
    let k = cfg.parallelism;
    if cfg.work_dir.exists() {
        fs::remove_dir_all(&cfg.work_dir)
            .with_context(|| format!("clear work dir {}", cfg.work_dir.display()))?;
    }

    let parts = split_lines(&cfg.input, &cfg.work_dir, k)?;
    let outputs: Vec<PathBuf> = (0..k).map(|i| shard_output_path(&cfg.work_dir, i)).collect();

    let mut children = Vec::with_capacity(k);
    for i in 0..k {
        let child = spawn_shard_worker(cfg, &parts.shards[i], &outputs[i])
            .with_context(|| format!("start supervisor for shard {i}"))?;
        info!(shard = i, pid = child.id(), "started shard supervisor");
        children.push(child);
    }

    let statuses = wait_for_supervisors(&mut children)?;
    for (i, status) in statuses.iter().enumerate() {
        if !status.success() {
            bail!("shard {i} supervisor exited abnormally ({status})");
        }
    }

    let merged = merge_shards(&outputs, &cfg.output)?;
    if merged != parts.lines {
        bail!(
            "output line count {merged} does not match input line count {}",
            parts.lines
        );
    }

    if cfg.keep_shards {
        info!(dir = %cfg.work_dir.display(), "keeping shard files");
    } else if let Err(err) = fs::remove_dir_all(&cfg.work_dir) {
        warn!(dir = %cfg.work_dir.display(), "could not remove work dir: {err}");
    }

    info!(output = %cfg.output.display(), lines = merged, shards = k, "run complete");
    Ok(RunSummary {
        lines: merged,
        shards: k,
    })
}

fn spawn_shard_worker(cfg: &RunConfig, input: &Path, output: &Path) -> Result<Child> {
    let exe = std::env::current_exe().context("locate current executable")?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("shard-worker")
        .arg("--input")
        .arg(input)
        .arg("--output")
        .arg(output)
        .arg("--transform")
        .arg(&cfg.transform)
        .arg("--timeout-secs")
        .arg(cfg.task_timeout.as_secs_f64().to_string())
        .stdin(Stdio::null());
    if cfg.liftover {
        cmd.arg("--liftover");
    }
    cmd.spawn().context("spawn shard-worker")
}

/// Short-timeout polling loop over the supervisor processes, periodically
/// logging which shards are still running.
fn wait_for_supervisors(children: &mut [Child]) -> Result<Vec<ExitStatus>> {
    let mut statuses: Vec<Option<ExitStatus>> = vec![None; children.len()];
    let mut polls = 0u64;
    loop {
        let mut running = Vec::new();
        for (i, child) in children.iter_mut().enumerate() {
            if statuses[i].is_some() {
                continue;
            }
            match child
                .try_wait()
                .with_context(|| format!("poll shard {i} supervisor"))?
            {
                Some(status) => {
                    info!(shard = i, %status, "shard supervisor exited");
                    statuses[i] = Some(status);
                }
                None => running.push(i),
            }
        }
        if running.is_empty() {
            break;
        }
        if polls % 10 == 0 {
            info!(shards = ?running, "shards still running");
        }
        polls += 1;
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(statuses.into_iter().map(|s| s.expect("status recorded")).collect())
}
