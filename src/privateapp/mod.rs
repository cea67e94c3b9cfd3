//! Private-app session store (§3 `PrivateAppsUser`, §6 cookies).
//!
//! Grounded on `_teacher_ref/middleware/auth.rs`'s `Claims`/session handling,
//! generalized from a single JWT-carried identity to a server-side session
//! keyed by a random id, since private-app sessions are stateful here rather
//! than bearer-token stateless.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One year, in seconds — the `otoroshi-tracking` cookie's lifetime (§6).
pub const TRACKING_COOKIE_MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;
pub const TRACKING_COOKIE_NAME: &str = "otoroshi-tracking";

/// Name of the per-service private-app session cookie (§6: `oto-papps-<suffix>`).
pub fn session_cookie_name(suffix: &str) -> String {
    format!("oto-papps-{suffix}")
}

/// A logged-in private-app identity (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateAppsUser {
    pub random_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub profile: Value,
    pub realm: String,
    pub created_at_ms: i64,
    pub expired_at_ms: i64,
}

impl PrivateAppsUser {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expired_at_ms
    }
}

/// In-memory session store, keyed by `randomId`. A clustered deployment
/// would back this with a shared store; out of scope here (§1 Non-goals).
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, PrivateAppsUser>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, name: String, email: String, realm: String, profile: Value, ttl_ms: i64) -> PrivateAppsUser {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let user = PrivateAppsUser {
            random_id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            profile,
            realm,
            created_at_ms: now_ms,
            expired_at_ms: now_ms + ttl_ms,
        };
        self.sessions.insert(user.random_id.clone(), user.clone());
        user
    }

    /// Fetch a live (non-expired) session, evicting it if it has expired.
    pub fn get(&self, random_id: &str, now_ms: i64) -> Option<PrivateAppsUser> {
        let expired = self
            .sessions
            .get(random_id)
            .map(|u| u.is_expired(now_ms))
            .unwrap_or(false);
        if expired {
            self.sessions.remove(random_id);
            return None;
        }
        self.sessions.get(random_id).map(|u| u.clone())
    }

    pub fn logout(&self, random_id: &str) {
        self.sessions.remove(random_id);
    }
}

/// Resolve a request's private-app identity from its `oto-papps-<suffix>`
/// cookie (§6), keyed by `service_id` per [`session_cookie_name`]. Shared by
/// the access gate (admission) and the pipeline (header templating) so both
/// agree on which cookie names which session.
pub fn user_from_cookie(
    headers: &HeaderMap,
    service_id: &str,
    sessions: &SessionStore,
    now_ms: i64,
) -> Option<PrivateAppsUser> {
    let cookie_name = session_cookie_name(service_id);
    let raw = headers.get(http::header::COOKIE)?.to_str().ok()?;
    let session_id = raw.split(';').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k.trim() == cookie_name).then(|| v.trim().to_string())
    })?;
    sessions.get(&session_id, now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_is_retrievable_before_expiry() {
        let store = SessionStore::new();
        let user = store.create("a".into(), "a@b.com".into(), "realm".into(), Value::Null, 60_000);
        assert!(store.get(&user.random_id, user.created_at_ms + 1).is_some());
    }

    #[test]
    fn expired_session_is_evicted_on_access() {
        let store = SessionStore::new();
        let user = store.create("a".into(), "a@b.com".into(), "realm".into(), Value::Null, 10);
        assert!(store.get(&user.random_id, user.created_at_ms + 1000).is_none());
        assert!(store.get(&user.random_id, user.created_at_ms + 1000).is_none());
    }

    #[test]
    fn logout_removes_session() {
        let store = SessionStore::new();
        let user = store.create("a".into(), "a@b.com".into(), "realm".into(), Value::Null, 60_000);
        store.logout(&user.random_id);
        assert!(store.get(&user.random_id, user.created_at_ms + 1).is_none());
    }

    #[test]
    fn user_from_cookie_resolves_by_service_scoped_cookie_name() {
        let store = SessionStore::new();
        let user = store.create("a".into(), "a@b.com".into(), "realm".into(), Value::Null, 60_000);
        let mut headers = HeaderMap::new();
        let cookie = format!("other=1; {}={}", session_cookie_name("svc1"), user.random_id);
        headers.insert(http::header::COOKIE, cookie.parse().unwrap());

        let found = user_from_cookie(&headers, "svc1", &store, user.created_at_ms + 1);
        assert_eq!(found.unwrap().random_id, user.random_id);

        assert!(user_from_cookie(&headers, "svc2", &store, user.created_at_ms + 1).is_none());
    }
}
