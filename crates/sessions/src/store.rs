use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use mg_domain::message::Message;
use mg_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A conversation tracked by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Stable lookup key, e.g. `"telegram:chat42"`.
    pub key: String,
    pub agent_id: String,
    pub channel: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: &str, agent_id: &str, channel: &str, channel_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.to_owned(),
            agent_id: agent_id.to_owned(),
            channel: channel.to_owned(),
            channel_id: channel_id.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Message/session persistence contract. Implementations must be safe for
/// parallel calls.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<()>;
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;
    async fn update(&self, session: Session) -> Result<()>;
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Resolve the session for a key, creating it on first contact.
    async fn get_or_create(
        &self,
        key: &str,
        agent_id: &str,
        channel: &str,
        channel_id: &str,
    ) -> Result<Session>;

    async fn append_message(&self, message: Message) -> Result<()>;

    /// The most recent `limit` messages in chronological order
    /// (`limit = 0` means all).
    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory reference implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Inner {
    /// session_id -> session.
    sessions: HashMap<String, Session>,
    /// key -> session_id.
    by_key: HashMap<String, String>,
    /// session_id -> ordered history.
    history: HashMap<String, Vec<Message>>,
}

/// The in-memory reference store.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.sessions.contains_key(&session.id) {
            return Err(Error::Other(format!(
                "session '{}' already exists",
                session.id
            )));
        }
        inner.by_key.insert(session.key.clone(), session.id.clone());
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.inner.read().sessions.get(session_id).cloned())
    }

    async fn update(&self, mut session: Session) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.sessions.contains_key(&session.id) {
            return Err(Error::Other(format!("session '{}' not found", session.id)));
        }
        session.updated_at = Utc::now();
        inner.by_key.insert(session.key.clone(), session.id.clone());
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.remove(session_id) {
            inner.by_key.remove(&session.key);
            inner.history.remove(session_id);
        }
        Ok(())
    }

    async fn get_or_create(
        &self,
        key: &str,
        agent_id: &str,
        channel: &str,
        channel_id: &str,
    ) -> Result<Session> {
        // Fast path under the read lock.
        {
            let inner = self.inner.read();
            if let Some(id) = inner.by_key.get(key) {
                if let Some(session) = inner.sessions.get(id) {
                    return Ok(session.clone());
                }
            }
        }

        let mut inner = self.inner.write();
        // Re-check: another task may have won the race.
        if let Some(id) = inner.by_key.get(key).cloned() {
            if let Some(session) = inner.sessions.get(&id) {
                return Ok(session.clone());
            }
        }
        let session = Session::new(key, agent_id, channel, channel_id);
        tracing::debug!(key = %key, session_id = %session.id, "session created");
        inner.by_key.insert(key.to_owned(), session.id.clone());
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn append_message(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.get_mut(&message.session_id) {
            session.updated_at = Utc::now();
        }
        inner
            .history
            .entry(message.session_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let inner = self.inner.read();
        let Some(history) = inner.history.get(session_id) else {
            return Ok(Vec::new());
        };
        let start = if limit > 0 && history.len() > limit {
            history.len() - limit
        } else {
            0
        };
        Ok(history[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_domain::message::Role;
    use std::sync::Arc;

    #[tokio::test]
    async fn get_or_create_is_stable_per_key() {
        let store = MemorySessionStore::new();
        let a = store
            .get_or_create("telegram:42", "main", "telegram", "42")
            .await
            .unwrap();
        let b = store
            .get_or_create("telegram:42", "main", "telegram", "42")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn history_append_and_limit() {
        let store = MemorySessionStore::new();
        let session = store
            .get_or_create("k", "main", "cli", "0")
            .await
            .unwrap();
        for i in 0..5 {
            store
                .append_message(Message::new(&session.id, Role::User, format!("m{i}")))
                .await
                .unwrap();
        }

        let all = store.get_history(&session.id, 0).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].content, "m0");

        let tail = store.get_history(&session.id, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");
        assert_eq!(tail[1].content, "m4");
    }

    #[tokio::test]
    async fn delete_clears_history_and_key() {
        let store = MemorySessionStore::new();
        let session = store.get_or_create("k", "a", "c", "1").await.unwrap();
        store
            .append_message(Message::new(&session.id, Role::User, "hi"))
            .await
            .unwrap();

        store.delete(&session.id).await.unwrap();
        assert!(store.get(&session.id).await.unwrap().is_none());
        assert!(store.get_history(&session.id, 0).await.unwrap().is_empty());

        // The key is free again: a fresh session gets a new id.
        let recreated = store.get_or_create("k", "a", "c", "1").await.unwrap();
        assert_ne!(recreated.id, session.id);
    }

    #[tokio::test]
    async fn parallel_get_or_create_single_winner() {
        let store = Arc::new(MemorySessionStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_create("same", "a", "c", "1").await.unwrap().id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all racers must observe one session");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_refreshes_timestamp() {
        let store = MemorySessionStore::new();
        let mut session = store.get_or_create("k", "a", "c", "1").await.unwrap();
        let before = session.updated_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        session.agent_id = "other".into();
        store.update(session.clone()).await.unwrap();

        let stored = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.agent_id, "other");
        assert!(stored.updated_at > before);
    }
}
