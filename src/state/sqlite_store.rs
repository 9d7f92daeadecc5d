//! Durable session state backed by keyed lists in `SQLite`.
//!
//! Each session owns two list-typed records, keyed `chat:<session_id>` and
//! `html_cache:<session_id>`. Elements are serialized JSON records with the
//! newest element at the list head (smaller `seq` = newer), and every key
//! carries a sliding expiration refreshed on each write. Each operation is
//! a single transaction, which is the sole concurrency-control mechanism.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio_rusqlite::Connection;

use crate::state::errors::StateResult;
use crate::state::message::{ChatMessage, ChatRole};
use crate::state::revision::HtmlRevision;
use crate::state::similarity;
use crate::state::transcript::{StoreFuture, TranscriptStore};
use crate::state::html_cache::RevisionStore;

/// List key for a session's chat transcript.
#[must_use]
pub fn chat_key(session_id: &str) -> String {
    format!("chat:{session_id}")
}

/// List key for a session's HTML revision cache.
#[must_use]
pub fn html_cache_key(session_id: &str) -> String {
    format!("html_cache:{session_id}")
}

/// Keyed-list primitive over `SQLite`: push-front, trim, range, index,
/// remove-then-push (promotion), delete, count, sliding expiry.
pub struct SqliteListStore {
    conn: Connection,
    ttl_seconds: i64,
}

impl SqliteListStore {
    /// Open (or create) the database and its list tables.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened. A failure here
    /// is a fatal configuration error, surfaced at startup.
    pub async fn open(path: impl AsRef<Path>, ttl_seconds: u64) -> StateResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS list_entries (
                    list_key TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (list_key, seq)
                );
                CREATE TABLE IF NOT EXISTS list_expiry (
                    list_key TEXT PRIMARY KEY,
                    expires_at INTEGER NOT NULL
                );",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            ttl_seconds: i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
        })
    }

    /// Insert `payload` at the head of `key` and trim the list to
    /// `max_size`, refreshing the key's expiration.
    async fn push_front(&self, key: String, payload: String, max_size: usize) -> StateResult<()> {
        let ttl = self.ttl_seconds;
        let max_size = i64::try_from(max_size).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| {
                let now = Utc::now().timestamp();
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &key, now)?;
                let head_seq: i64 = tx.query_row(
                    "SELECT COALESCE(MIN(seq), 1) - 1 FROM list_entries WHERE list_key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO list_entries (list_key, seq, payload) VALUES (?1, ?2, ?3)",
                    rusqlite::params![key, head_seq, payload],
                )?;
                tx.execute(
                    "DELETE FROM list_entries
                     WHERE list_key = ?1 AND seq NOT IN (
                         SELECT seq FROM list_entries
                         WHERE list_key = ?1 ORDER BY seq ASC LIMIT ?2
                     )",
                    rusqlite::params![key, max_size],
                )?;
                refresh_expiry(&tx, &key, now + ttl)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All payloads for `key`, newest first. Expired keys read as empty.
    async fn range(&self, key: String) -> StateResult<Vec<String>> {
        let payloads = self
            .conn
            .call(move |conn| {
                let now = Utc::now().timestamp();
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &key, now)?;
                let payloads = {
                    let mut stmt = tx.prepare(
                        "SELECT payload FROM list_entries
                         WHERE list_key = ?1 ORDER BY seq ASC",
                    )?;
                    stmt.query_map(rusqlite::params![key], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?
                };
                tx.commit()?;
                Ok(payloads)
            })
            .await?;
        Ok(payloads)
    }

    /// Payload at `index` for `key` (0 = head), `None` when out of range.
    async fn index(&self, key: String, index: usize) -> StateResult<Option<String>> {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        let payload = self
            .conn
            .call(move |conn| {
                let now = Utc::now().timestamp();
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &key, now)?;
                let payload = {
                    let mut stmt = tx.prepare(
                        "SELECT payload FROM list_entries
                         WHERE list_key = ?1 ORDER BY seq ASC LIMIT 1 OFFSET ?2",
                    )?;
                    let mut rows = stmt.query_map(rusqlite::params![key, index], |row| {
                        row.get::<_, String>(0)
                    })?;
                    rows.next().transpose()?
                };
                tx.commit()?;
                Ok(payload)
            })
            .await?;
        Ok(payload)
    }

    /// Atomically remove the first occurrence of `payload` in `key` and
    /// reinsert it at the head. A missing payload leaves the list as-is;
    /// either way the key's expiration is refreshed.
    async fn remove_then_push(&self, key: String, payload: String) -> StateResult<()> {
        let ttl = self.ttl_seconds;
        self.conn
            .call(move |conn| {
                let now = Utc::now().timestamp();
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &key, now)?;
                let removed = tx.execute(
                    "DELETE FROM list_entries WHERE rowid = (
                         SELECT rowid FROM list_entries
                         WHERE list_key = ?1 AND payload = ?2
                         ORDER BY seq ASC LIMIT 1
                     )",
                    rusqlite::params![key, payload],
                )?;
                if removed > 0 {
                    let head_seq: i64 = tx.query_row(
                        "SELECT COALESCE(MIN(seq), 1) - 1 FROM list_entries WHERE list_key = ?1",
                        rusqlite::params![key],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        "INSERT INTO list_entries (list_key, seq, payload) VALUES (?1, ?2, ?3)",
                        rusqlite::params![key, head_seq, payload],
                    )?;
                }
                refresh_expiry(&tx, &key, now + ttl)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete `key` and its expiration record.
    async fn remove_key(&self, key: String) -> StateResult<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM list_entries WHERE list_key = ?1",
                    rusqlite::params![key],
                )?;
                tx.execute(
                    "DELETE FROM list_expiry WHERE list_key = ?1",
                    rusqlite::params![key],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Number of elements stored under `key`.
    async fn count(&self, key: String) -> StateResult<usize> {
        let count = self
            .conn
            .call(move |conn| {
                let now = Utc::now().timestamp();
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &key, now)?;
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM list_entries WHERE list_key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(count)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Expiration instant recorded for `key`, if any.
    #[cfg(test)]
    async fn expires_at(&self, key: String) -> StateResult<Option<i64>> {
        let expires = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT expires_at FROM list_expiry WHERE list_key = ?1")?;
                let mut rows =
                    stmt.query_map(rusqlite::params![key], |row| row.get::<_, i64>(0))?;
                Ok(rows.next().transpose()?)
            })
            .await?;
        Ok(expires)
    }
}

fn purge_if_expired(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
    now: i64,
) -> Result<(), rusqlite::Error> {
    let expired: i64 = tx.query_row(
        "SELECT COUNT(*) FROM list_expiry WHERE list_key = ?1 AND expires_at <= ?2",
        rusqlite::params![key, now],
        |row| row.get(0),
    )?;
    if expired > 0 {
        tx.execute(
            "DELETE FROM list_entries WHERE list_key = ?1",
            rusqlite::params![key],
        )?;
        tx.execute(
            "DELETE FROM list_expiry WHERE list_key = ?1",
            rusqlite::params![key],
        )?;
    }
    Ok(())
}

fn refresh_expiry(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
    expires_at: i64,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO list_expiry (list_key, expires_at) VALUES (?1, ?2)
         ON CONFLICT(list_key) DO UPDATE SET expires_at = excluded.expires_at",
        rusqlite::params![key, expires_at],
    )?;
    Ok(())
}

/// Deserialize a list of persisted records, skipping malformed payloads so
/// one corrupt row never blocks all history access.
fn parse_payloads<T: serde::de::DeserializeOwned>(key: &str, payloads: Vec<String>) -> Vec<T> {
    let mut records = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match serde_json::from_str(&payload) {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!(%key, %error, "skipping malformed stored record");
            }
        }
    }
    records
}

/// Durable transcript store for one session.
pub struct SqliteTranscriptStore {
    store: Arc<SqliteListStore>,
    key: String,
    max_size: usize,
}

impl SqliteTranscriptStore {
    /// Bind a transcript store to `session_id` in the shared database.
    #[must_use]
    pub fn new(store: Arc<SqliteListStore>, session_id: &str, max_size: usize) -> Self {
        Self {
            store,
            key: chat_key(session_id),
            max_size,
        }
    }
}

impl TranscriptStore for SqliteTranscriptStore {
    fn append(&self, role: ChatRole, content: String) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move {
            let message = ChatMessage::now(role, content);
            let payload = serde_json::to_string(&message)?;
            self.store
                .push_front(self.key.clone(), payload, self.max_size)
                .await
        })
    }

    fn all(&self) -> StoreFuture<'_, StateResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            let payloads = self.store.range(self.key.clone()).await?;
            // Stored newest-first; reverse into conversation order.
            let mut messages: Vec<ChatMessage> = parse_payloads(&self.key, payloads);
            messages.reverse();
            Ok(messages)
        })
    }

    fn clear(&self) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move { self.store.remove_key(self.key.clone()).await })
    }

    fn size(&self) -> StoreFuture<'_, StateResult<usize>> {
        Box::pin(async move { self.store.count(self.key.clone()).await })
    }
}

/// Durable revision cache for one session.
pub struct SqliteRevisionStore {
    store: Arc<SqliteListStore>,
    key: String,
    max_size: usize,
}

impl SqliteRevisionStore {
    /// Bind a revision cache to `session_id` in the shared database.
    #[must_use]
    pub fn new(store: Arc<SqliteListStore>, session_id: &str, max_size: usize) -> Self {
        Self {
            store,
            key: html_cache_key(session_id),
            max_size,
        }
    }
}

impl RevisionStore for SqliteRevisionStore {
    fn add(&self, query: String, html: String) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move {
            let revision = HtmlRevision::now(query, html);
            let payload = serde_json::to_string(&revision)?;
            self.store
                .push_front(self.key.clone(), payload, self.max_size)
                .await
        })
    }

    fn all(&self) -> StoreFuture<'_, StateResult<Vec<HtmlRevision>>> {
        Box::pin(async move {
            let payloads = self.store.range(self.key.clone()).await?;
            Ok(parse_payloads(&self.key, payloads))
        })
    }

    fn get(&self, index: usize) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>> {
        Box::pin(async move {
            let Some(payload) = self.store.index(self.key.clone(), index).await? else {
                return Ok(None);
            };
            match serde_json::from_str(&payload) {
                Ok(revision) => Ok(Some(revision)),
                Err(error) => {
                    tracing::warn!(key = %self.key, %error, "skipping malformed stored record");
                    Ok(None)
                }
            }
        })
    }

    fn find_similar(
        &self,
        query: &str,
        threshold: f64,
    ) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>> {
        let query = query.to_string();
        Box::pin(async move {
            let payloads = self.store.range(self.key.clone()).await?;
            let revisions: Vec<HtmlRevision> = parse_payloads(&self.key, payloads);
            Ok(similarity::best_match(&revisions, &query, threshold).cloned())
        })
    }

    fn promote(&self, entry: &HtmlRevision) -> StoreFuture<'_, StateResult<()>> {
        let entry = entry.clone();
        Box::pin(async move {
            let payload = serde_json::to_string(&entry)?;
            self.store.remove_then_push(self.key.clone(), payload).await
        })
    }

    fn clear(&self) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move { self.store.remove_key(self.key.clone()).await })
    }

    fn size(&self) -> StoreFuture<'_, StateResult<usize>> {
        Box::pin(async move { self.store.count(self.key.clone()).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir, ttl_seconds: u64) -> Arc<SqliteListStore> {
        let path = dir.path().join("state.db");
        Arc::new(SqliteListStore::open(&path, ttl_seconds).await.unwrap())
    }

    #[tokio::test]
    async fn transcript_round_trips_in_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let transcript = SqliteTranscriptStore::new(store, "s1", 100);

        transcript
            .append(ChatRole::User, "first".into())
            .await
            .unwrap();
        transcript
            .append(ChatRole::Agent, "second".into())
            .await
            .unwrap();

        let messages = transcript.all().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].content, "second");
        assert_eq!(transcript.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn transcript_bound_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let transcript = SqliteTranscriptStore::new(store, "s1", 3);

        for n in 0..5 {
            transcript
                .append(ChatRole::User, format!("message {n}"))
                .await
                .unwrap();
        }

        let contents: Vec<String> = transcript
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn revisions_are_newest_first_and_promotable() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let cache = SqliteRevisionStore::new(store, "s1", 10);

        cache
            .add("Show me your projects".into(), "<div>projects</div>".into())
            .await
            .unwrap();
        cache
            .add("Add more spacing".into(), "<div>spaced</div>".into())
            .await
            .unwrap();

        let latest = cache.latest().await.unwrap().unwrap();
        assert_eq!(latest.query, "Add more spacing");

        let second = cache.get(1).await.unwrap().unwrap();
        cache.promote(&second).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 2);
        assert_eq!(
            cache.latest().await.unwrap().unwrap().query,
            "Show me your projects"
        );
    }

    #[tokio::test]
    async fn promote_of_missing_entry_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let cache = SqliteRevisionStore::new(store, "s1", 10);

        cache.add("kept".into(), "<p/>".into()).await.unwrap();
        let ghost = HtmlRevision::now("vanished", "<p>gone</p>");
        cache.promote(&ghost).await.unwrap();

        let revisions = cache.all().await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].query, "kept");
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let a = SqliteTranscriptStore::new(Arc::clone(&store), "alice", 10);
        let b = SqliteTranscriptStore::new(store, "bob", 10);

        a.append(ChatRole::User, "hello from alice".into())
            .await
            .unwrap();

        assert_eq!(a.size().await.unwrap(), 1);
        assert_eq!(b.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_payload_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let key = chat_key("s1");
        store
            .push_front(key.clone(), "{not json".into(), 10)
            .await
            .unwrap();

        let transcript = SqliteTranscriptStore::new(Arc::clone(&store), "s1", 10);
        transcript
            .append(ChatRole::User, "valid".into())
            .await
            .unwrap();

        let messages = transcript.all().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "valid");
        // The raw list still holds both rows.
        assert_eq!(store.count(key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn writes_refresh_the_sliding_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let transcript = SqliteTranscriptStore::new(Arc::clone(&store), "s1", 10);

        transcript
            .append(ChatRole::User, "hello".into())
            .await
            .unwrap();

        let expires = store.expires_at(chat_key("s1")).await.unwrap().unwrap();
        assert!(expires > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn expired_keys_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 86_400).await;
        let key = chat_key("s1");
        store.push_front(key.clone(), "\"x\"".into(), 10).await.unwrap();

        // Force the key into the past.
        store
            .conn
            .call({
                let key = key.clone();
                move |conn| {
                    conn.execute(
                        "UPDATE list_expiry SET expires_at = 0 WHERE list_key = ?1",
                        rusqlite::params![key],
                    )?;
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(store.count(key).await.unwrap(), 0);
    }
}
