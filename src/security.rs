//! User registration and credential verification.
//!
//! Email/password records are kept behind a lock and snapshotted to
//! `users.json` under the store root on every mutation, the same scheme as
//! the file metadata store. Passwords are stored as Argon2 PHC strings and
//! never in the clear.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::storage::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: UserId,
    users: Vec<UserRecord>,
}

struct Inner {
    next_id: UserId,
    users: BTreeMap<UserId, UserRecord>,
}

/// Persistent email/password record store with store-assigned ids.
#[derive(Clone)]
pub struct UserStore {
    path: PathBuf,
    inner: Arc<RwLock<Inner>>,
}

impl UserStore {
    /// Open the store rooted at the given folder, creating it if absent and
    /// reloading the `users.json` snapshot when one exists.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating store root {}", root.display()))?;
        let path = root.join("users.json");
        let snap: Snapshot = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Snapshot::default()
        };
        let mut users = BTreeMap::new();
        let mut next_id = snap.next_id.max(1);
        for u in snap.users {
            next_id = next_id.max(u.id + 1);
            users.insert(u.id, u);
        }
        Ok(Self { path, inner: Arc::new(RwLock::new(Inner { next_id, users })) })
    }

    /// Register a new user. Missing fields and duplicate emails each fail
    /// with their own cause; the password is hashed before anything is
    /// persisted.
    pub fn create(&self, email: &str, password: &str) -> AppResult<UserRecord> {
        if email.is_empty() {
            return Err(AppError::user("missing_email", "Missing email"));
        }
        if password.is_empty() {
            return Err(AppError::user("missing_password", "Missing password"));
        }
        let hash = hash_password(password)
            .map_err(|e| AppError::internal("hash_failed", e.to_string()))?;
        let mut inner = self.inner.write();
        if inner.users.values().any(|u| u.email == email) {
            return Err(AppError::user("already_exist", "Already exist"));
        }
        let id = inner.next_id;
        let rec = UserRecord { id, email: email.to_string(), password_hash: hash };
        inner.users.insert(id, rec.clone());
        inner.next_id = id + 1;
        if let Err(e) = self.persist(&inner) {
            inner.users.remove(&id);
            inner.next_id = id;
            return Err(AppError::io("store_write_failed", e.to_string()));
        }
        Ok(rec)
    }

    /// Verify credentials against the stored hash; absent and wrong-password
    /// are indistinguishable.
    pub fn authenticate(&self, email: &str, password: &str) -> Option<UserRecord> {
        let inner = self.inner.read();
        let user = inner.users.values().find(|u| u.email == email)?;
        if verify_password(&user.password_hash, password) {
            Some(user.clone())
        } else {
            None
        }
    }

    pub fn get(&self, id: UserId) -> Option<UserRecord> {
        self.inner.read().users.get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.inner.read().users.len()
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        let snap = Snapshot {
            next_id: inner.next_id,
            users: inner.users.values().cloned().collect(),
        };
        let text = serde_json::to_string(&snap)?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_authenticate() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UserStore::open(tmp.path()).unwrap();
        let user = store.create("bob@dylan.com", "toto1234!").unwrap();
        assert_eq!(user.email, "bob@dylan.com");
        assert!(store.authenticate("bob@dylan.com", "toto1234!").is_some());
        assert!(store.authenticate("bob@dylan.com", "wrong").is_none());
        assert!(store.authenticate("nobody@dylan.com", "toto1234!").is_none());
    }

    #[test]
    fn password_is_stored_hashed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UserStore::open(tmp.path()).unwrap();
        let user = store.create("bob@dylan.com", "toto1234!").unwrap();
        assert_ne!(user.password_hash, "toto1234!");
        assert!(user.password_hash.starts_with("$argon2"));
    }

    #[test]
    fn duplicate_email_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UserStore::open(tmp.path()).unwrap();
        store.create("bob@dylan.com", "toto1234!").unwrap();
        let err = store.create("bob@dylan.com", "other").unwrap_err();
        assert_eq!(err.code_str(), "already_exist");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn missing_fields_have_distinct_causes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UserStore::open(tmp.path()).unwrap();
        assert_eq!(store.create("", "pw").unwrap_err().code_str(), "missing_email");
        assert_eq!(store.create("a@b.c", "").unwrap_err().code_str(), "missing_password");
    }

    #[test]
    fn snapshot_reload_sees_users() {
        let tmp = tempfile::tempdir().unwrap();
        let id;
        {
            let store = UserStore::open(tmp.path()).unwrap();
            id = store.create("bob@dylan.com", "toto1234!").unwrap().id;
        }
        let reopened = UserStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.get(id).unwrap().email, "bob@dylan.com");
        assert!(reopened.authenticate("bob@dylan.com", "toto1234!").is_some());
    }
}
