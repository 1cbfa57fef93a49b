use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::Session;

pub const COOKIE_NAME: &str = "mealie_kroger_session";

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// In-memory sessions addressed by a signed cookie.
pub struct SessionStore {
    secret: String,
    idle_timeout: Duration,
    max_sessions: usize,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

struct Entry {
    session: Session,
    last_seen: Instant,
}

/// A session checked out of the store for the length of one request.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub id: Uuid,
    pub session: Session,
    /// The browser did not present a usable cookie.
    pub is_new: bool,
    loaded: Session,
}

impl SessionStore {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    fn signature(&self, id: &Uuid) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(id.as_hyphenated().to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Cookie value identifying session `id`.
    pub fn cookie_value(&self, id: &Uuid) -> String {
        format!("{}.{}", id.as_hyphenated(), self.signature(id))
    }

    /// Full `Set-Cookie` header value for session `id`.
    pub fn set_cookie(&self, id: &Uuid) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            COOKIE_NAME,
            self.cookie_value(id)
        )
    }

    pub fn verify(&self, cookie_value: &str) -> Option<Uuid> {
        let (id, signature) = cookie_value.split_once('.')?;
        let id = Uuid::parse_str(id).ok()?;
        if self.signature(&id) != signature {
            return None;
        }
        Some(id)
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Look up the session named by a `Cookie` header.
    ///
    /// A signed cookie keeps its id even when the session behind it expired or
    /// was never stored; it just starts out empty. Without a valid cookie a
    /// new id is issued.
    pub async fn load(&self, cookie_header: Option<&str>) -> LoadedSession {
        let id = cookie_header
            .and_then(find_cookie)
            .and_then(|value| self.verify(value));

        let id = match id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                debug!(message = "Starting new session", session_id = %id);
                return LoadedSession {
                    id,
                    session: Session::default(),
                    is_new: true,
                    loaded: Session::default(),
                };
            }
        };

        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(&id)
            .filter(|entry| entry.last_seen.elapsed() < self.idle_timeout)
            .map(|entry| entry.session.clone())
            .unwrap_or_default();
        LoadedSession {
            id,
            loaded: session.clone(),
            session,
            is_new: false,
        }
    }

    /// Write back the keys this request changed.
    ///
    /// Keys the request left alone keep whatever another request stored in
    /// the meantime, so a token rotated elsewhere survives.
    pub async fn save(&self, loaded: LoadedSession) {
        let changes = changed_keys(&loaded.loaded, &loaded.session);
        let now = Instant::now();

        let mut sessions = self.sessions.lock().await;
        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < idle_timeout);

        if let Some(entry) = sessions.get_mut(&loaded.id) {
            apply(&mut entry.session, changes);
            entry.last_seen = now;
            if entry.session.is_empty() {
                sessions.remove(&loaded.id);
            }
            return;
        }

        let mut session = Session::default();
        apply(&mut session, changes);
        if session.is_empty() {
            return;
        }

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                debug!(message = "Evicting least recently used session", session_id = %oldest);
                sessions.remove(&oldest);
            }
        }
        sessions.insert(
            loaded.id,
            Entry {
                session,
                last_seen: now,
            },
        );
    }
}

/// Keys whose value differs between `before` and `after`; `None` marks a removal.
fn changed_keys(before: &Session, after: &Session) -> Vec<(String, Option<Value>)> {
    let mut changes: Vec<_> = after
        .0
        .iter()
        .filter(|(key, value)| before.0.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), Some(value.clone())))
        .collect();
    changes.extend(
        before
            .0
            .keys()
            .filter(|key| !after.0.contains_key(*key))
            .map(|key| (key.clone(), None)),
    );
    changes
}

fn apply(session: &mut Session, changes: Vec<(String, Option<Value>)>) {
    for (key, value) in changes {
        match value {
            Some(value) => {
                session.insert(key, value);
            }
            None => {
                session.remove(&key);
            }
        }
    }
}

fn find_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == COOKIE_NAME {
            Some(value)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{FixedClock, Token};

    fn cookie(store: &SessionStore, id: &Uuid) -> String {
        format!("{}={}", COOKIE_NAME, store.cookie_value(id))
    }

    async fn stored_session(store: &SessionStore) -> Uuid {
        let mut loaded = store.load(None).await;
        loaded
            .session
            .set_token(&Token::new("a1", "bearer", 1800, Some("r1".into()), 0));
        let id = loaded.id;
        store.save(loaded).await;
        id
    }

    #[test]
    fn signed_cookie_verifies() {
        let store = SessionStore::new("secret");
        let id = Uuid::new_v4();
        let value = store.cookie_value(&id);
        assert_eq!(store.verify(&value), Some(id));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let store = SessionStore::new("secret");
        let other = SessionStore::new("other secret");
        let id = Uuid::new_v4();

        assert_eq!(other.verify(&store.cookie_value(&id)), None);

        let forged = format!("{}.{}", Uuid::new_v4(), store.signature(&id));
        assert_eq!(store.verify(&forged), None);
        assert_eq!(store.verify("garbage"), None);
    }

    #[tokio::test]
    async fn saved_session_is_loaded_back() {
        let store = SessionStore::new("secret");

        let mut loaded = store.load(None).await;
        assert!(loaded.is_new);
        loaded.session.insert("next", Value::String("/".into()));
        let id = loaded.id;
        store.save(loaded).await;

        let header = format!("theme=dark; {}", store.set_cookie(&id));
        let header = header.split("; Path").next().unwrap();
        let loaded = store.load(Some(header)).await;
        assert!(!loaded.is_new);
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.session.get("next"), Some(&Value::String("/".into())));
    }

    #[tokio::test]
    async fn forgotten_session_keeps_its_id() {
        let store = SessionStore::new("secret");
        let id = Uuid::new_v4();

        let loaded = store.load(Some(&cookie(&store, &id))).await;
        assert!(!loaded.is_new);
        assert_eq!(loaded.id, id);
        assert!(loaded.session.is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_keep_rotated_token() {
        let store = SessionStore::new("secret");
        let id = stored_session(&store).await;
        let cookie = cookie(&store, &id);

        let mut refreshing = store.load(Some(&cookie)).await;
        let mut other = store.load(Some(&cookie)).await;
        refreshing
            .session
            .set_token(&Token::new("a2", "bearer", 1800, Some("r2".into()), 10));
        other.session.set_next("/add-to-cart?list_id=1");
        store.save(refreshing).await;
        store.save(other).await;

        let mut loaded = store.load(Some(&cookie)).await;
        let token = loaded.session.token(&FixedClock(0)).unwrap().unwrap();
        assert_eq!(token.access_token(), "a2");
        assert_eq!(token.refresh_token(), Some("r2"));
        assert_eq!(
            loaded.session.take_next().as_deref(),
            Some("/add-to-cart?list_id=1")
        );
    }

    #[tokio::test]
    async fn removal_by_one_request_is_kept() {
        let store = SessionStore::new("secret");
        let id = stored_session(&store).await;
        let cookie = cookie(&store, &id);

        let mut logout = store.load(Some(&cookie)).await;
        let reader = store.load(Some(&cookie)).await;
        logout.session.remove_token();
        store.save(logout).await;
        store.save(reader).await;

        let loaded = store.load(Some(&cookie)).await;
        assert!(loaded.session.is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn cookieless_requests_are_not_stored() {
        let store = SessionStore::new("secret");
        for _ in 0..1000 {
            let loaded = store.load(None).await;
            store.save(loaded).await;
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::new("secret").with_idle_timeout(Duration::ZERO);
        let id = stored_session(&store).await;

        let loaded = store.load(Some(&cookie(&store, &id))).await;
        assert!(loaded.session.is_empty());

        store.save(loaded).await;
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn least_recently_used_session_is_evicted() {
        let store = SessionStore::new("secret").with_max_sessions(2);
        let first = stored_session(&store).await;
        let second = stored_session(&store).await;

        let mut touched = store.load(Some(&cookie(&store, &first))).await;
        touched.session.set_next("/");
        store.save(touched).await;

        let third = stored_session(&store).await;

        assert_eq!(store.len().await, 2);
        let first = store.load(Some(&cookie(&store, &first))).await;
        assert!(!first.session.is_empty());
        let second = store.load(Some(&cookie(&store, &second))).await;
        assert!(second.session.is_empty());
        let third = store.load(Some(&cookie(&store, &third))).await;
        assert!(!third.session.is_empty());
    }
}
