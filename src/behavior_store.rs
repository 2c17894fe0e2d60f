//! Persistence for sender behavior and trusted-sender records.
//!
//! Upserts are keyed by (sender, user). The file-backed store rewrites
//! its JSON snapshot on every put; an optional remote endpoint receives a
//! best-effort copy that never blocks or fails the local write.

use crate::engines::behavior::{BehaviorRecord, TrustedRecord};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn key(sender: &str, user_id: Option<&str>) -> String {
    format!("{}|{}", sender.to_lowercase(), user_id.unwrap_or(""))
}

pub trait BehaviorStore: Send + Sync {
    fn get_behavior(&self, sender: &str, user_id: Option<&str>) -> Option<BehaviorRecord>;
    fn put_behavior(&self, record: BehaviorRecord) -> anyhow::Result<()>;
    fn get_trusted(&self, sender: &str, user_id: Option<&str>) -> Option<TrustedRecord>;
    fn put_trusted(&self, record: TrustedRecord) -> anyhow::Result<()>;
}

/// In-memory store, the default for tests and one-shot CLI runs.
pub struct MemoryStore {
    behavior: Mutex<HashMap<String, BehaviorRecord>>,
    trusted: Mutex<HashMap<String, TrustedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(HashMap::new()),
            trusted: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorStore for MemoryStore {
    fn get_behavior(&self, sender: &str, user_id: Option<&str>) -> Option<BehaviorRecord> {
        self.behavior
            .lock()
            .ok()?
            .get(&key(sender, user_id))
            .cloned()
    }

    fn put_behavior(&self, record: BehaviorRecord) -> anyhow::Result<()> {
        let k = key(&record.sender, record.user_id.as_deref());
        self.behavior
            .lock()
            .map_err(|_| anyhow::anyhow!("behavior store poisoned"))?
            .insert(k, record);
        Ok(())
    }

    fn get_trusted(&self, sender: &str, user_id: Option<&str>) -> Option<TrustedRecord> {
        self.trusted
            .lock()
            .ok()?
            .get(&key(sender, user_id))
            .cloned()
    }

    fn put_trusted(&self, record: TrustedRecord) -> anyhow::Result<()> {
        let k = key(&record.sender, record.user_id.as_deref());
        self.trusted
            .lock()
            .map_err(|_| anyhow::anyhow!("trusted store poisoned"))?
            .insert(k, record);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    behavior: HashMap<String, BehaviorRecord>,
    trusted: HashMap<String, TrustedRecord>,
}

/// JSON-file-backed store. Loads the snapshot at open and rewrites it on
/// every upsert.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreSnapshot>,
    remote_endpoint: Option<String>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read store file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse store file {}", path.display()))?
        } else {
            StoreSnapshot::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
            remote_endpoint: None,
        })
    }

    /// Mirror upserts to a remote store. Replication is best-effort: a
    /// failed sync is logged and the local write still succeeds.
    pub fn with_remote_sync(mut self, endpoint: impl Into<String>) -> Self {
        self.remote_endpoint = Some(endpoint.into());
        self
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write store file {}", self.path.display()))?;
        Ok(())
    }

    fn sync_remote<T: Serialize>(&self, kind: &str, record: &T) {
        let Some(endpoint) = &self.remote_endpoint else {
            return;
        };
        let Ok(payload) = serde_json::to_value(record) else {
            return;
        };
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), kind);

        // Fire and forget when a runtime is available; skip otherwise.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let client = reqwest::Client::new();
                if let Err(e) = client.post(&url).json(&payload).send().await {
                    log::warn!("remote store sync to {} failed: {}", url, e);
                }
            });
        } else {
            log::debug!("no async runtime, skipping remote sync to {}", url);
        }
    }
}

impl BehaviorStore for JsonFileStore {
    fn get_behavior(&self, sender: &str, user_id: Option<&str>) -> Option<BehaviorRecord> {
        self.state
            .lock()
            .ok()?
            .behavior
            .get(&key(sender, user_id))
            .cloned()
    }

    fn put_behavior(&self, record: BehaviorRecord) -> anyhow::Result<()> {
        let k = key(&record.sender, record.user_id.as_deref());
        self.sync_remote("behavior", &record);
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("store poisoned"))?;
        state.behavior.insert(k, record);
        self.persist(&state)
    }

    fn get_trusted(&self, sender: &str, user_id: Option<&str>) -> Option<TrustedRecord> {
        self.state
            .lock()
            .ok()?
            .trusted
            .get(&key(sender, user_id))
            .cloned()
    }

    fn put_trusted(&self, record: TrustedRecord) -> anyhow::Result<()> {
        let k = key(&record.sender, record.user_id.as_deref());
        self.sync_remote("trusted", &record);
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("store poisoned"))?;
        state.trusted.insert(k, record);
        self.persist(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::behavior::{apply_interaction, Disposition};

    #[test]
    fn test_memory_store_keys_by_sender_and_user() {
        let store = MemoryStore::new();
        let rec = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Safe, 100);
        store.put_behavior(rec).unwrap();

        assert!(store.get_behavior("A@B.COM", Some("u1")).is_some());
        assert!(store.get_behavior("a@b.com", Some("u2")).is_none());
        assert!(store.get_behavior("a@b.com", None).is_none());
    }

    #[test]
    fn test_memory_store_upsert_replaces() {
        let store = MemoryStore::new();
        let first = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Safe, 100);
        store.put_behavior(first.clone()).unwrap();
        let second = apply_interaction(Some(first), "a@b.com", Some("u1"), Disposition::Safe, 200);
        store.put_behavior(second).unwrap();

        let stored = store.get_behavior("a@b.com", Some("u1")).unwrap();
        assert_eq!(stored.total, 2);
        assert_eq!(stored.last_seen, 200);
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = std::env::temp_dir().join("phishscore-store-test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("store.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            let rec = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Phishing, 100);
            store.put_behavior(rec).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let stored = reopened.get_behavior("a@b.com", Some("u1")).unwrap();
        assert_eq!(stored.phishing, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
