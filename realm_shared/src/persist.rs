//! Persistence.
//!
//! One JSON document keyed by username holds every player record; the whole
//! document is rewritten on flush. Flushing is coalesced by the server
//! (mark-dirty, interval sweep, always on disconnect/shutdown) rather than
//! per-mutation. A missing or corrupt document degrades to an empty store
//! with a logged warning; the game keeps running.
//!
//! The chat transcript is a separate append-only file, one timestamped line
//! per accepted message.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::player::PlayerRecord;

/// Store interface: load-or-create at login, mirror writes during play,
/// flush on the server's schedule. Single writer; the server task owns the
/// store and is the only mutator.
#[async_trait]
pub trait UserStore: Send {
    /// Looks up a record by username.
    fn get(&self, name: &str) -> Option<PlayerRecord>;

    /// Inserts or replaces a record and marks the store dirty.
    fn upsert(&mut self, record: PlayerRecord);

    /// Whether there are unflushed writes.
    fn is_dirty(&self) -> bool;

    /// Writes the store out if dirty.
    async fn flush(&mut self) -> anyhow::Result<()>;
}

/// Whole-document JSON store (`users.json`-equivalent).
pub struct JsonUserStore {
    path: PathBuf,
    records: HashMap<String, PlayerRecord>,
    dirty: bool,
}

impl JsonUserStore {
    /// Opens the store, loading any existing document leniently.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "User store corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "User store unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            records,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    fn get(&self, name: &str) -> Option<PlayerRecord> {
        self.records.get(name).cloned()
    }

    fn upsert(&mut self, record: PlayerRecord) {
        self.records.insert(record.name.clone(), record);
        self.dirty = true;
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.records).context("serialize user store")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("write {}", self.path.display()))?;
        self.dirty = false;
        debug!(path = %self.path.display(), records = self.records.len(), "User store flushed");
        Ok(())
    }
}

/// Append-only chat transcript.
pub struct ChatTranscript {
    path: PathBuf,
}

impl ChatTranscript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line. Errors are logged and swallowed; chat must not take
    /// the server down.
    pub fn append(&self, user: &str, text: &str) {
        let line = format!("[{}] {}: {}\n", chrono::Utc::now().to_rfc3339(), user, text);
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Chat transcript write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flush_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut store = JsonUserStore::open(&path);
        assert!(store.is_empty());

        store.upsert(PlayerRecord::fresh("Alice"));
        assert!(store.is_dirty());
        store.flush().await.unwrap();
        assert!(!store.is_dirty());

        let reloaded = JsonUserStore::open(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("Alice").unwrap().level, "town");
    }

    #[tokio::test]
    async fn corrupt_document_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonUserStore::open(&path);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn flush_without_writes_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut store = JsonUserStore::open(&path);
        store.flush().await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn transcript_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_log.txt");

        let transcript = ChatTranscript::new(&path);
        transcript.append("Alice", "hello");
        transcript.append("Bob", "hi there");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Alice: hello"));
        assert!(lines[1].contains("Bob: hi there"));
    }
}
