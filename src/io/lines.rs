//! Byte-exact line streams over optionally-compressed files.
//!
//! Every component in the pipeline reads and writes newline-terminated
//! records through these two helpers, so compression stays a property of
//! the file name rather than of the caller.

use crate::io::compression::{decode_reader, encode_writer};
use anyhow::{Context, Result};
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Open a buffered, decompressing reader over `path`.
pub fn line_reader(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = decode_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    Ok(Box::new(BufReader::new(rdr)))
}

/// Create `path` (and parent directories) and return a buffered,
/// compressing writer over it. Dropping the writer finishes the
/// compressed stream; call `flush` first to surface write errors.
pub fn line_writer(path: impl AsRef<Path>) -> Result<Box<dyn Write>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    encode_writer(f, path).with_context(|| format!("setup compression for {}", path.display()))
}

/// Number of newline-terminated records in `path`. A final unterminated
/// line counts as one record.
pub fn count_lines(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let mut rdr = line_reader(path)?;
    let mut buf = Vec::new();
    let mut count = 0u64;
    loop {
        buf.clear();
        let n = rdr
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        count += 1;
    }
    Ok(count)
}

/// Read every line of `path` into memory, delimiters stripped. Intended
/// for small files and tests; the pipeline itself streams.
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let rdr = line_reader(path)?;
    let mut out = Vec::new();
    for (i, line) in rdr.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?;
        out.push(line);
    }
    Ok(out)
}
