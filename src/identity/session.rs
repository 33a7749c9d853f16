use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use base64::Engine;
use parking_lot::RwLock;
use crate::tprintln;

use crate::storage::UserId;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: UserId,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_token() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Token → user mapping with a fixed time-to-live and explicit revocation.
///
/// State is instance-owned and shared by cloning the handle; there are no
/// process-wide session tables. Expired, revoked and unknown tokens all
/// resolve to absent.
#[derive(Clone)]
pub struct SessionManager {
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<SessionToken, Session>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(24 * 60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn issue(&self, user_id: UserId) -> Session {
        let now = Instant::now();
        let token = gen_token();
        let sess = Session {
            token: token.clone(),
            user_id,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(token, sess.clone());
        tprintln!("session.issue user={} ttl_secs={}", user_id, self.ttl.as_secs());
        sess
    }

    /// Resolve a token to its user id while unexpired. Expired entries are
    /// pruned on the way out.
    pub fn resolve(&self, token: &str) -> Option<UserId> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            if let Some(sess) = map.get(token) {
                if sess.expires_at > now {
                    Some(sess.user_id)
                } else {
                    drop_key = Some(token.to_string());
                    None
                }
            } else { None }
        };
        if let Some(k) = drop_key {
            self.sessions.write().remove(&k);
        }
        out
    }

    /// Remove a token mapping; true if it was present.
    pub fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token).is_some();
        tprintln!("session.revoke removed={}", removed);
        removed
    }
}
