//! Raw-byte blob backend.
//!
//! Payloads are written under a content root using freshly generated UUID v4
//! file names, so concurrent writers never contend on a path. The returned
//! handle is the absolute path of the written blob. Derived renditions
//! (variants, e.g. thumbnails) live next to the original under
//! `<handle>_<variant>` and are resolved by suffix at read time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a blob store on `root`, creating the directory recursively.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating content root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &Path { &self.root }

    /// Write `bytes` under a freshly generated path and return its handle.
    pub fn write(&self, bytes: &[u8]) -> Result<String> {
        let path = self.root.join(Uuid::new_v4().to_string());
        fs::write(&path, bytes)
            .with_context(|| format!("writing blob {}", path.display()))?;
        debug!(target: "cabinet::storage", "blob write: {} ({} bytes)", path.display(), bytes.len());
        Ok(path.to_string_lossy().into_owned())
    }

    /// Read the blob at `handle`, or a named variant rendition of it.
    /// Returns None when the resolved path does not exist.
    pub fn read(&self, handle: &str, variant: Option<&str>) -> Result<Option<Vec<u8>>> {
        let resolved = match variant {
            Some(v) => format!("{handle}_{v}"),
            None => handle.to_string(),
        };
        let path = Path::new(&resolved);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)
            .with_context(|| format!("reading blob {}", path.display()))?;
        Ok(Some(bytes))
    }
}
