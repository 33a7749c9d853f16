//!
//! cabinet storage module
//! ----------------------
//! This module implements the on-disk stores backing the file service: the
//! metadata store (`FileStore`) holding one record per folder or file, and the
//! raw-byte blob backend (`blob::BlobStore`). Records are kept in memory
//! behind a lock and persisted as a whole-snapshot JSON rewrite under the
//! configured root on every mutation; the snapshot is reloaded on open.
//!
//! Key responsibilities:
//! - Store-assigned `u64` ids, monotonically increasing in creation order,
//!   never reused or mutated.
//! - Point lookup by id, optionally owner-scoped.
//! - Owner-scoped filtered scans sorted by id descending with offset/limit.
//! - Conditional visibility update scoped by id + owner in a single write.
//!
//! The snapshot write happens under the store's write lock, so the persisted
//! state always reflects a consistent mutation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod blob;
pub use blob::BlobStore;

pub type FileId = u64;
pub type UserId = u64;

/// Number of items per listing page.
pub const PAGE_SIZE: usize = 20;

/// Record kind. Folders never carry content; files and images always do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Folder,
    File,
    Image,
}

impl FileKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(Self::Folder),
            "file" => Some(Self::File),
            "image" => Some(Self::Image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::File => "file",
            Self::Image => "image",
        }
    }

    pub fn is_folder(&self) -> bool { matches!(self, Self::Folder) }
}

/// A single file or folder record.
///
/// `parent_id` is an explicit option: `None` is the root sentinel, `Some(id)`
/// references a folder record that existed at creation time. `content_ref` is
/// the opaque blob handle, present iff the kind is not `folder`; it never
/// appears in public shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_id: UserId,
    pub name: String,
    pub kind: FileKind,
    #[serde(default)]
    pub parent_id: Option<FileId>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub content_ref: Option<String>,
}

impl FileRecord {
    fn matches_parent(&self, filter: ParentFilter) -> bool {
        match filter {
            ParentFilter::Any => true,
            ParentFilter::Root => self.parent_id.is_none(),
            ParentFilter::In(id) => self.parent_id == Some(id),
        }
    }
}

/// Parent constraint applied to listing scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentFilter {
    Any,
    Root,
    In(FileId),
}

/// Fields of a record to insert; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: UserId,
    pub name: String,
    pub kind: FileKind,
    pub parent_id: Option<FileId>,
    pub is_public: bool,
    pub content_ref: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: FileId,
    records: Vec<FileRecord>,
}

struct Inner {
    next_id: FileId,
    records: BTreeMap<FileId, FileRecord>,
}

/// Persistent metadata store for file records.
///
/// Cloning shares the underlying map and snapshot path; all handles observe
/// the same state.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    inner: Arc<RwLock<Inner>>,
}

impl FileStore {
    /// Open the store rooted at the given folder, creating it if absent and
    /// reloading the `files.json` snapshot when one exists. Id assignment
    /// continues after the highest persisted id.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating store root {}", root.display()))?;
        let path = root.join("files.json");
        let snap: Snapshot = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Snapshot::default()
        };
        let mut records = BTreeMap::new();
        let mut next_id = snap.next_id.max(1);
        for r in snap.records {
            next_id = next_id.max(r.id + 1);
            records.insert(r.id, r);
        }
        Ok(Self { path, inner: Arc::new(RwLock::new(Inner { next_id, records })) })
    }

    /// Insert a new record, assigning the next id. The in-memory insert is
    /// rolled back when the snapshot write fails, so memory and disk never
    /// diverge.
    pub fn insert(&self, new: NewFile) -> Result<FileRecord> {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        let rec = FileRecord {
            id,
            owner_id: new.owner_id,
            name: new.name,
            kind: new.kind,
            parent_id: new.parent_id,
            is_public: new.is_public,
            content_ref: new.content_ref,
        };
        inner.records.insert(id, rec.clone());
        inner.next_id = id + 1;
        if let Err(e) = self.persist(&inner) {
            inner.records.remove(&id);
            inner.next_id = id;
            return Err(e);
        }
        debug!(target: "cabinet::storage", "insert: id={} kind={} owner={}", id, rec.kind.as_str(), rec.owner_id);
        Ok(rec)
    }

    /// Point lookup by id, regardless of owner.
    pub fn get(&self, id: FileId) -> Option<FileRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    /// Point lookup scoped to an owner. Absent and not-owned are the same.
    pub fn get_owned(&self, id: FileId, owner_id: UserId) -> Option<FileRecord> {
        self.get(id).filter(|r| r.owner_id == owner_id)
    }

    /// Scan records for an owner, newest first (id descending), constrained
    /// by `parent` and windowed by `offset`/`limit`.
    pub fn scan(&self, owner_id: UserId, parent: ParentFilter, offset: usize, limit: usize) -> Vec<FileRecord> {
        let inner = self.inner.read();
        inner
            .records
            .values()
            .rev()
            .filter(|r| r.owner_id == owner_id && r.matches_parent(parent))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Conditionally set `is_public` on the record matching both id and
    /// owner. Returns the updated record, or None when nothing matched; a
    /// failed snapshot write rolls the change back.
    pub fn set_public(&self, id: FileId, owner_id: UserId, is_public: bool) -> Result<Option<FileRecord>> {
        let mut inner = self.inner.write();
        let prev;
        let updated;
        {
            let Some(rec) = inner.records.get_mut(&id) else { return Ok(None) };
            if rec.owner_id != owner_id {
                return Ok(None);
            }
            prev = rec.is_public;
            rec.is_public = is_public;
            updated = rec.clone();
        }
        if let Err(e) = self.persist(&inner) {
            if let Some(rec) = inner.records.get_mut(&id) {
                rec.is_public = prev;
            }
            return Err(e);
        }
        Ok(Some(updated))
    }

    /// Total number of records, all owners.
    pub fn count(&self) -> usize {
        self.inner.read().records.len()
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        let snap = Snapshot {
            next_id: inner.next_id,
            records: inner.records.values().cloned().collect(),
        };
        let text = serde_json::to_string(&snap)?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
