//! Pluggable compression for transparent line-file I/O.
//!
//! The pipeline treats compressed containers purely as byte streams; codec
//! selection happens here, by file extension first and magic bytes as a
//! fallback on reads. Gzip is the default container (feature
//! `compression-gzip`); zstd is available behind `compression-zstd`.
//! Additional codecs can be registered at runtime with [`register_codec`].

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};

static CODECS: RwLock<Option<Vec<Arc<dyn Codec>>>> = RwLock::new(None);

fn builtin_codecs() -> Vec<Arc<dyn Codec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(Gzip),
        #[cfg(feature = "compression-zstd")]
        Arc::new(Zstd),
    ]
}

fn registry() -> Vec<Arc<dyn Codec>> {
    let mut lock = CODECS.write().unwrap();
    lock.get_or_insert_with(builtin_codecs).clone()
}

/// Register a custom codec; it participates in detection alongside the
/// built-ins from then on.
pub fn register_codec(codec: Arc<dyn Codec>) {
    let mut lock = CODECS.write().unwrap();
    lock.get_or_insert_with(builtin_codecs).push(codec);
}

/// A compression algorithm detectable by extension or magic bytes.
///
/// Implementations must be `Send + Sync`; they live in a global registry.
pub trait Codec: Send + Sync {
    /// Human-readable codec name, e.g. `"gzip"`.
    fn name(&self) -> &str;

    /// Lowercase extensions including the leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    /// Magic byte signature, or `None` if the format has none.
    fn magic(&self) -> Option<&[u8]>;

    fn reader(&self, inner: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    fn writer(&self, inner: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

fn codec_for_path(path: &Path) -> Option<Arc<dyn Codec>> {
    let name = path.to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn Codec>> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    registry()
        .into_iter()
        .find(|codec| codec.magic().is_some_and(|magic| head.starts_with(magic)))
}

/// Wrap `reader` with decompression when the path extension or leading
/// magic bytes identify a registered codec; pass through otherwise.
pub fn decode_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = codec_for_path(path_hint.as_ref()) {
        return codec
            .reader(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    let mut buffered = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buffered) {
        return codec
            .reader(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with compression when the path extension identifies a
/// registered codec; otherwise return it buffered and uncompressed.
pub fn encode_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Write>> {
    if let Some(codec) = codec_for_path(path_hint.as_ref()) {
        return codec
            .writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

#[cfg(feature = "compression-gzip")]
struct Gzip;

#[cfg(feature = "compression-gzip")]
impl Codec for Gzip {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn reader(&self, inner: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(inner)))
    }

    fn writer(&self, inner: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(inner, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct Zstd;

#[cfg(feature = "compression-zstd")]
impl Codec for Zstd {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn reader(&self, inner: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(inner).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn writer(&self, inner: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(inner, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}
