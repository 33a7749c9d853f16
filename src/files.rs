//!
//! cabinet file service
//! --------------------
//! The core service enforcing hierarchy, ownership and visibility rules over
//! the metadata and blob stores.
//!
//! Responsibilities:
//! - Creation with parent/type validation; for content-bearing kinds the
//!   decoded payload is written to the blob store strictly before the
//!   metadata record is committed.
//! - Owner-scoped point lookup; ownership mismatch is reported as NotFound
//!   so existence never leaks.
//! - Paginated owner-scoped listing, newest first.
//! - Visibility toggling via a single conditional id+owner write.
//! - Authorized content retrieval with public/private semantics and optional
//!   variant renditions.

use base64::Engine;
use serde::Serialize;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::storage::{
    BlobStore, FileId, FileKind, FileRecord, FileStore, NewFile, ParentFilter, UserId, PAGE_SIZE,
};

/// Public shape of a file record. The content handle is internal only and is
/// never serialized here.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileView {
    pub id: FileId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Root is rendered as 0 on the wire.
    #[serde(rename = "parentId")]
    pub parent_id: FileId,
    #[serde(rename = "isPublic")]
    pub is_public: bool,
}

impl From<&FileRecord> for FileView {
    fn from(r: &FileRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.owner_id,
            name: r.name.clone(),
            kind: r.kind,
            parent_id: r.parent_id.unwrap_or(0),
            is_public: r.is_public,
        }
    }
}

/// Infer a content type from a file name's extension; octet-stream fallback.
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name).first_or_octet_stream().essence_str().to_string()
}

#[derive(Clone)]
pub struct FileService {
    files: FileStore,
    blobs: BlobStore,
}

impl FileService {
    pub fn new(files: FileStore, blobs: BlobStore) -> Self {
        Self { files, blobs }
    }

    /// Metadata store handle, for inventory counters.
    pub fn store(&self) -> &FileStore { &self.files }

    /// Create a folder or content-bearing file for `owner_id`.
    ///
    /// Validation order (first failure wins): name, kind, data-for-non-folder,
    /// then parent existence and parent kind. The store assigns the id.
    /// `parent_id` is the normalized option; the wire sentinel 0 is handled
    /// at the transport edge.
    pub fn create(
        &self,
        owner_id: UserId,
        name: Option<&str>,
        kind: Option<&str>,
        parent_id: Option<FileId>,
        is_public: bool,
        data: Option<&str>,
    ) -> AppResult<FileRecord> {
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => return Err(AppError::user("missing_name", "Missing name")),
        };
        let kind = match kind.and_then(FileKind::parse) {
            Some(k) => k,
            None => return Err(AppError::user("missing_type", "Missing type")),
        };
        if !kind.is_folder() && data.is_none() {
            return Err(AppError::user("missing_data", "Missing data"));
        }
        if let Some(pid) = parent_id {
            let Some(parent) = self.files.get(pid) else {
                return Err(AppError::user("parent_not_found", "Parent not found"));
            };
            if !parent.kind.is_folder() {
                return Err(AppError::user("parent_not_folder", "Parent is not a folder"));
            }
        }

        // Blob write strictly precedes the metadata commit.
        let content_ref = if kind.is_folder() {
            None
        } else {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data.unwrap_or_default())
                .map_err(|_| AppError::user("invalid_data", "Data is not valid base64"))?;
            let handle = self
                .blobs
                .write(&bytes)
                .map_err(|e| AppError::io("blob_write_failed", e.to_string()))?;
            Some(handle)
        };

        match self.files.insert(NewFile {
            owner_id,
            name: name.to_string(),
            kind,
            parent_id,
            is_public,
            content_ref: content_ref.clone(),
        }) {
            Ok(rec) => Ok(rec),
            Err(e) => {
                // The blob, if any, is now orphaned. Tolerated, never silent.
                if let Some(handle) = content_ref {
                    error!(target: "cabinet::files",
                        "metadata insert failed after blob write; orphaned blob at {}: {}", handle, e);
                }
                Err(AppError::io("metadata_write_failed", e.to_string()))
            }
        }
    }

    /// Owner-scoped point lookup. Ownership mismatch is indistinguishable
    /// from nonexistence.
    pub fn get(&self, owner_id: UserId, file_id: FileId) -> AppResult<FileRecord> {
        self.files
            .get_owned(file_id, owner_id)
            .ok_or_else(|| AppError::not_found("file_not_found", "Not found"))
    }

    /// Paginated owner-scoped listing, newest first (id descending), 20 per
    /// page. Pages are offset-based; shifts under concurrent inserts are
    /// accepted.
    pub fn list(&self, owner_id: UserId, parent: ParentFilter, page: usize) -> Vec<FileView> {
        self.files
            .scan(owner_id, parent, page.saturating_mul(PAGE_SIZE), PAGE_SIZE)
            .iter()
            .map(FileView::from)
            .collect()
    }

    /// Flip `is_public` on a record owned by `owner_id`. A wrong id and a
    /// record owned by someone else fail identically.
    pub fn set_visibility(&self, owner_id: UserId, file_id: FileId, is_public: bool) -> AppResult<FileRecord> {
        match self.files.set_public(file_id, owner_id, is_public) {
            Ok(Some(rec)) => Ok(rec),
            Ok(None) => Err(AppError::not_found("file_not_found", "Not found")),
            Err(e) => Err(AppError::io("metadata_write_failed", e.to_string())),
        }
    }

    /// Fetch raw content for a record, enforcing visibility.
    ///
    /// `requester` is the resolved user id when a token was presented;
    /// unauthenticated calls pass None. `variant` selects a derived rendition
    /// by handle suffix. Returns the bytes and a content type inferred from
    /// the record name.
    pub fn get_content(
        &self,
        requester: Option<UserId>,
        file_id: FileId,
        variant: Option<&str>,
    ) -> AppResult<(Vec<u8>, String)> {
        let Some(rec) = self.files.get(file_id) else {
            return Err(AppError::not_found("file_not_found", "Not found"));
        };
        if rec.kind.is_folder() {
            return Err(AppError::user("folder_no_content", "A folder doesn't have content"));
        }
        if !rec.is_public && requester != Some(rec.owner_id) {
            // Ownership failure masked as NotFound
            return Err(AppError::not_found("file_not_found", "Not found"));
        }
        let Some(handle) = rec.content_ref.as_deref() else {
            // Non-folders always carry a handle; a record without one is a
            // store inconsistency and reads as missing content.
            error!(target: "cabinet::files", "record {} has kind {} but no content handle", rec.id, rec.kind.as_str());
            return Err(AppError::not_found("file_not_found", "Not found"));
        };
        let bytes = match self.blobs.read(handle, variant) {
            Ok(Some(b)) => b,
            Ok(None) => return Err(AppError::not_found("file_not_found", "Not found")),
            Err(e) => return Err(AppError::io("blob_read_failed", e.to_string())),
        };
        Ok((bytes, content_type_for(&rec.name)))
    }
}
