//! In-memory cascade sessions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use kepco_addr::Cascade;

/// One user's address selection
pub struct Session {
    pub cascade: Cascade,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            cascade: Cascade::new(),
            created_at: now,
            last_used: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Sessions keyed by id; each cascade is mutated by one request at a time.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let handle = Arc::new(Mutex::new(Session::new()));
        self.sessions.write().await.insert(id, handle.clone());
        debug!("Created session {}", id);
        (id, handle)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than the TTL. Busy sessions are kept.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => now - session.last_used <= self.ttl,
            Err(_) => true,
        });
        before - sessions.len()
    }
}
