//! Blob-storage collaborators, specified as interfaces.
//!
//! The pipeline only touches remote storage before and after the core
//! runs, so this module defines the contract ([`BlobStore`]), the URI and
//! local-cache conventions, and a filesystem-backed implementation used in
//! tests and local runs. Real cloud backends plug in behind the trait.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A fully-qualified blob URI, `scheme://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUri {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

impl BlobUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let Some((scheme, rest)) = uri.split_once("://") else {
            bail!("must be a fully qualified URI beginning with <scheme>://, got {uri:?}");
        };
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if scheme.is_empty() || bucket.is_empty() || key.is_empty() {
            bail!("blob URI needs a scheme, bucket, and key: {uri:?}");
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// The conventional local mirror path, `<root>/<bucket>/<key>`.
    pub fn local_path(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(&self.bucket).join(&self.key)
    }
}

impl std::fmt::Display for BlobUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Storage operations the pipeline consumes. Implementations download to
/// the conventional local mirror path and report remote existence/size.
pub trait BlobStore: Send + Sync {
    /// Fetch `uri` into the local mirror and return the local path.
    fn download(&self, uri: &BlobUri) -> Result<PathBuf>;

    /// Upload a local file to `uri`.
    fn upload(&self, local: &Path, uri: &BlobUri) -> Result<()>;

    fn exists(&self, uri: &BlobUri) -> Result<bool>;

    /// Size of the remote blob in bytes; error if it does not exist.
    fn size(&self, uri: &BlobUri) -> Result<u64>;

    /// Root of the local mirror this store downloads into.
    fn mirror_root(&self) -> &Path;

    /// True when the local mirror already holds a file of the same size as
    /// the remote blob, making a download redundant.
    fn already_downloaded(&self, uri: &BlobUri) -> Result<bool> {
        let local = uri.local_path(self.mirror_root());
        Ok(match fs::metadata(&local) {
            Ok(meta) => meta.len() == self.size(uri)?,
            Err(_) => false,
        })
    }
}

/// A [`BlobStore`] over a local directory tree, laid out `bucket/key`.
/// Stands in for remote storage in tests and offline runs.
pub struct LocalStore {
    store_root: PathBuf,
    mirror_root: PathBuf,
}

impl LocalStore {
    pub fn new(store_root: impl Into<PathBuf>, mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
            mirror_root: mirror_root.into(),
        }
    }

    fn blob_path(&self, uri: &BlobUri) -> PathBuf {
        uri.local_path(&self.store_root)
    }
}

impl BlobStore for LocalStore {
    fn download(&self, uri: &BlobUri) -> Result<PathBuf> {
        let src = self.blob_path(uri);
        let dst = uri.local_path(&self.mirror_root);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        info!(uri = %uri, local = %dst.display(), "downloading");
        fs::copy(&src, &dst).with_context(|| format!("download {uri} to {}", dst.display()))?;
        Ok(dst)
    }

    fn upload(&self, local: &Path, uri: &BlobUri) -> Result<()> {
        let dst = self.blob_path(uri);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        info!(local = %local.display(), uri = %uri, "uploading");
        fs::copy(local, &dst).with_context(|| format!("upload {} to {uri}", local.display()))?;
        Ok(())
    }

    fn exists(&self, uri: &BlobUri) -> Result<bool> {
        Ok(self.blob_path(uri).exists())
    }

    fn size(&self, uri: &BlobUri) -> Result<u64> {
        let path = self.blob_path(uri);
        let meta =
            fs::metadata(&path).with_context(|| format!("blob {uri} does not exist"))?;
        Ok(meta.len())
    }

    fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }
}
