use anyhow::Result;
use shardpipe::io::lines::{count_lines, line_reader, line_writer, read_lines};
use std::io::{Read, Write};

#[test]
fn gzip_round_trip_by_extension() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("data.ndjson.gz");

    let mut w = line_writer(&path)?;
    writeln!(w, "{{\"id\":1}}")?;
    writeln!(w, "{{\"id\":2}}")?;
    w.flush()?;
    drop(w);

    // The file on disk is really gzip, not plain text.
    let raw = std::fs::read(&path)?;
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    assert_eq!(read_lines(&path)?, vec!["{\"id\":1}", "{\"id\":2}"]);
    Ok(())
}

#[test]
fn magic_bytes_detect_compression_without_extension() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let gz = tmp.path().join("data.ndjson.gz");
    let mut w = line_writer(&gz)?;
    writeln!(w, "{{\"id\":7}}")?;
    w.flush()?;
    drop(w);

    // Same bytes under a name that gives no extension hint.
    let bare = tmp.path().join("data");
    std::fs::copy(&gz, &bare)?;
    assert_eq!(read_lines(&bare)?, vec!["{\"id\":7}"]);
    Ok(())
}

#[test]
fn uncompressed_paths_pass_through() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("plain.ndjson");
    let mut w = line_writer(&path)?;
    writeln!(w, "{{\"id\":1}}")?;
    w.flush()?;
    drop(w);

    let mut text = String::new();
    line_reader(&path)?.read_to_string(&mut text)?;
    assert_eq!(text, "{\"id\":1}\n");
    Ok(())
}

#[test]
fn count_lines_includes_unterminated_final_line() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("data.ndjson.gz");
    let mut w = line_writer(&path)?;
    w.write_all(b"{\"a\":1}\n{\"b\":2}\n{\"c\":3}")?;
    w.flush()?;
    drop(w);

    assert_eq!(count_lines(&path)?, 3);

    let empty = tmp.path().join("empty.ndjson.gz");
    let mut w = line_writer(&empty)?;
    w.flush()?;
    drop(w);
    assert_eq!(count_lines(&empty)?, 0);
    Ok(())
}
