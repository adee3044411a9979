//! Round-robin line partitioning and shard-major reassembly.
//!
//! Line *i* (zero-based) of the input lands in shard `i mod K`, byte for
//! byte, trailing delimiter included. The merge concatenates shard outputs
//! in shard-index order, so the final file is shard-major, NOT the original
//! input order, and that is the contract. Re-running the merge on the same
//! shard outputs is byte-identical.

use crate::io::lines::{line_reader, line_writer};
use crate::progress::ProgressLogger;
use anyhow::{Context, Result, bail};
use std::fs::create_dir_all;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// The shard files produced by one partitioning pass.
#[derive(Debug, Clone)]
pub struct PartitionSet {
    pub shards: Vec<PathBuf>,
    pub lines: u64,
}

/// Conventional name of shard input `index` under `dir`.
pub fn shard_input_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("part-{index}.ndjson.gz"))
}

/// Conventional name of shard output `index` under `dir`.
pub fn shard_output_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("out-{index}.ndjson.gz"))
}

/// Split `input` into `partitions` shard files under `dir`.
///
/// All shard writers stay open for the whole scan and are released on
/// every exit path; any open or write failure aborts the operation, since
/// a partial partition set is not usable.
pub fn split_lines(input: &Path, dir: &Path, partitions: usize) -> Result<PartitionSet> {
    if partitions == 0 {
        bail!("partition count must be at least 1");
    }
    create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;

    let mut reader = line_reader(input)?;
    let shards: Vec<PathBuf> = (0..partitions)
        .map(|i| shard_input_path(dir, i))
        .collect();
    // Writers are plain RAII values: an early return drops and closes
    // every one of them.
    let mut writers = shards
        .iter()
        .map(|p| line_writer(p))
        .collect::<Result<Vec<_>>>()?;

    let mut progress = ProgressLogger::new("split", None, Duration::from_secs(10));
    let mut buf = Vec::new();
    let mut lines = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", input.display()))?;
        if n == 0 {
            break;
        }
        let shard = (lines as usize) % partitions;
        writers[shard]
            .write_all(&buf)
            .with_context(|| format!("write {}", shards[shard].display()))?;
        lines += 1;
        progress.update(lines);
    }
    for (writer, path) in writers.iter_mut().zip(&shards) {
        writer
            .flush()
            .with_context(|| format!("flush {}", path.display()))?;
    }
    drop(writers);

    progress.finish(lines);
    info!(input = %input.display(), partitions, lines, "partitioned input");
    Ok(PartitionSet { shards, lines })
}

/// Concatenate shard outputs verbatim, in shard-index order, into
/// `output`. A shard's final line is given its missing newline so shard
/// boundaries never glue two records together.
pub fn merge_shards(shards: &[PathBuf], output: &Path) -> Result<u64> {
    let mut writer = line_writer(output)?;
    let mut progress = ProgressLogger::new("merge", None, Duration::from_secs(10));
    let mut lines = 0u64;
    for path in shards {
        let mut reader = line_reader(path)?;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            writer
                .write_all(&buf)
                .with_context(|| format!("write {}", output.display()))?;
            lines += 1;
            progress.update(lines);
        }
    }
    writer.flush().context("flush merged output")?;
    drop(writer);

    progress.finish(lines);
    info!(output = %output.display(), shards = shards.len(), lines, "merged shard outputs");
    Ok(lines)
}
