use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Key/value store standing in for browser local storage.
///
/// Values are JSON documents. The whole map is rewritten on every mutation, so
/// two processes sharing a file get last-write-wins semantics.
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn open(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::in_memory());
        };

        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<BTreeMap<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "local store unreadable; starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read local store {}", path.display()));
            }
        };
        debug!(path = %path.display(), keys = entries.len(), "local store opened");

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Returns `None` both for a missing key and for a value that no longer parses as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().await;
        let value = entries.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, key, "local store value has unexpected shape");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(value).context("serialize local store value")?;
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await
    }

    #[cfg(test)]
    pub async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let raw = serde_json::to_vec_pretty(entries).context("serialize local store")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = LocalStore::open(Some(path.clone())).await.unwrap();
        store.set("residue_link_profile_ana", &vec!["a", "b"]).await.unwrap();
        drop(store);

        let reopened = LocalStore::open(Some(path)).await.unwrap();
        let got: Option<Vec<String>> = reopened.get("residue_link_profile_ana").await;
        assert_eq!(got, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = LocalStore::open(Some(path)).await.unwrap();
        assert!(store.keys_with_prefix("").await.is_empty());
    }

    #[tokio::test]
    async fn wrong_shape_reads_as_missing() {
        let store = LocalStore::in_memory();
        store.set("k", &"just a string").await.unwrap();
        let got: Option<Vec<u32>> = store.get("k").await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn prefix_scan_and_remove() {
        let store = LocalStore::in_memory();
        store.set("residue_link_profile_a", &1).await.unwrap();
        store.set("residue_link_profile_b", &2).await.unwrap();
        store.set("residue_link_gallery_a", &3).await.unwrap();

        let keys = store.keys_with_prefix("residue_link_profile_").await;
        assert_eq!(keys, vec!["residue_link_profile_a", "residue_link_profile_b"]);

        store.remove("residue_link_profile_a").await.unwrap();
        assert_eq!(store.keys_with_prefix("residue_link_profile_").await.len(), 1);
    }
}
