use anyhow::Result;
use shardpipe::io::lines::{line_writer, read_lines};
use shardpipe::partition::{merge_shards, split_lines};
use std::io::Write;
use std::path::Path;

fn write_gz_lines(path: &Path, lines: &[&str]) -> Result<()> {
    let mut w = line_writer(path)?;
    for line in lines {
        writeln!(w, "{line}")?;
    }
    w.flush()?;
    Ok(())
}

#[test]
fn round_robin_assignment_and_positions() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.ndjson.gz");
    let lines: Vec<String> = (0..25).map(|i| format!("{{\"id\":{i}}}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_gz_lines(&input, &refs)?;

    for k in [1usize, 2, 3, 7] {
        let dir = tmp.path().join(format!("k{k}"));
        let parts = split_lines(&input, &dir, k)?;
        assert_eq!(parts.lines, 25);
        assert_eq!(parts.shards.len(), k);

        // Line i sits at position floor(i / k) of shard i mod k, and the
        // shard line counts sum back to the input count.
        let shard_lines: Vec<Vec<String>> = parts
            .shards
            .iter()
            .map(|p| read_lines(p))
            .collect::<Result<_>>()?;
        let total: usize = shard_lines.iter().map(Vec::len).sum();
        assert_eq!(total, 25);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(&shard_lines[i % k][i / k], line);
        }
    }
    Ok(())
}

#[test]
fn split_preserves_exact_bytes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.ndjson.gz");
    // Odd spacing and a final line without a trailing newline.
    let mut w = line_writer(&input)?;
    w.write_all(b"{\"a\": 1}  \n")?;
    w.write_all(b"\t{\"b\":2}\n")?;
    w.write_all(b"{\"c\":3}")?;
    w.flush()?;
    drop(w);

    let parts = split_lines(&input, &tmp.path().join("shards"), 2)?;
    assert_eq!(parts.lines, 3);
    assert_eq!(read_lines(&parts.shards[0])?, vec!["{\"a\": 1}  ", "{\"c\":3}"]);
    assert_eq!(read_lines(&parts.shards[1])?, vec!["\t{\"b\":2}"]);
    Ok(())
}

#[test]
fn more_shards_than_lines_leaves_empty_shards() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.ndjson.gz");
    write_gz_lines(&input, &["{\"id\":0}", "{\"id\":1}"])?;

    let parts = split_lines(&input, &tmp.path().join("shards"), 5)?;
    assert_eq!(parts.lines, 2);
    assert_eq!(parts.shards.len(), 5);
    for (i, shard) in parts.shards.iter().enumerate() {
        let expected = if i < 2 { 1 } else { 0 };
        assert_eq!(read_lines(shard)?.len(), expected, "shard {i}");
    }
    Ok(())
}

#[test]
fn zero_partitions_is_an_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.ndjson.gz");
    write_gz_lines(&input, &["{}"])?;
    assert!(split_lines(&input, &tmp.path().join("shards"), 0).is_err());
    Ok(())
}

#[test]
fn merge_is_shard_major_not_input_order() -> Result<()> {
    // The documented scenario: [A,B,C,D] with K=2 splits to shard0=[A,C],
    // shard1=[B,D] and merges to [A,C,B,D].
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.ndjson.gz");
    write_gz_lines(&input, &["\"A\"", "\"B\"", "\"C\"", "\"D\""])?;

    let parts = split_lines(&input, &tmp.path().join("shards"), 2)?;
    assert_eq!(read_lines(&parts.shards[0])?, vec!["\"A\"", "\"C\""]);
    assert_eq!(read_lines(&parts.shards[1])?, vec!["\"B\"", "\"D\""]);

    let merged = tmp.path().join("merged.ndjson.gz");
    let lines = merge_shards(&parts.shards, &merged)?;
    assert_eq!(lines, 4);
    assert_eq!(read_lines(&merged)?, vec!["\"A\"", "\"C\"", "\"B\"", "\"D\""]);
    Ok(())
}

#[test]
fn merge_normalizes_missing_trailing_newline() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let a = tmp.path().join("out-0.ndjson.gz");
    let b = tmp.path().join("out-1.ndjson.gz");
    let mut w = line_writer(&a)?;
    w.write_all(b"{\"id\":0}")?; // no trailing newline
    w.flush()?;
    drop(w);
    write_gz_lines(&b, &["{\"id\":1}"])?;

    let merged = tmp.path().join("merged.ndjson.gz");
    let lines = merge_shards(&[a, b], &merged)?;
    assert_eq!(lines, 2);
    assert_eq!(read_lines(&merged)?, vec!["{\"id\":0}", "{\"id\":1}"]);
    Ok(())
}

#[test]
fn merge_is_idempotent() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.ndjson.gz");
    let lines: Vec<String> = (0..50).map(|i| format!("{{\"id\":{i}}}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_gz_lines(&input, &refs)?;
    let parts = split_lines(&input, &tmp.path().join("shards"), 3)?;

    let first = tmp.path().join("merged-1.ndjson.gz");
    let second = tmp.path().join("merged-2.ndjson.gz");
    merge_shards(&parts.shards, &first)?;
    merge_shards(&parts.shards, &second)?;
    assert_eq!(std::fs::read(&first)?, std::fs::read(&second)?);
    Ok(())
}
