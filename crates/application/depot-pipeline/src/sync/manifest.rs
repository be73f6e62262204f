use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use depot_store::{ObjectStore, PutObject};

use crate::sync::SyncError;

/// Tombstone ledger persisted as one JSON object (`{ key: removed_at }`) in the bucket.
///
/// Reads and writes require a prior `load()` in this session so a stale or unseen
/// document is never written back over the stored one. `save()` only writes when an
/// entry was set or deleted since the last load or save.
pub struct RemovalManifest {
    store: Arc<dyn ObjectStore>,
    key: String,
    entries: BTreeMap<String, String>,
    loaded: bool,
    changed: bool,
}

impl RemovalManifest {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_key(store, depot_config::REMOVAL_MANIFEST_KEY)
    }

    pub fn with_key(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            entries: BTreeMap::new(),
            loaded: false,
            changed: false,
        }
    }

    /// Store key of the manifest document itself.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Fetch the document once per session. A missing document is an empty manifest.
    pub async fn load(&mut self) -> Result<(), SyncError> {
        if self.loaded {
            return Ok(());
        }

        self.entries = match self.store.get(&self.key).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::ManifestCorrupt(format!("{}: {e}", self.key)))?,
            Err(e) if e.is_not_found() => {
                tracing::debug!("No removal manifest at {}, starting empty", self.key);
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        self.loaded = true;
        self.changed = false;
        Ok(())
    }

    /// Write the document back if anything changed. Returns whether a write happened.
    pub async fn save(&mut self) -> Result<bool, SyncError> {
        self.ensure_loaded()?;
        if !self.changed {
            return Ok(false);
        }

        let body = serde_json::to_vec(&self.entries)
            .map_err(|e| SyncError::ManifestCorrupt(format!("serialize: {e}")))?;
        self.store
            .put(PutObject {
                key: self.key.clone(),
                body: Bytes::from(body),
                content_type: Some("application/json".to_string()),
                ..PutObject::default()
            })
            .await?;

        self.changed = false;
        Ok(true)
    }

    fn ensure_loaded(&self) -> Result<(), SyncError> {
        if self.loaded {
            Ok(())
        } else {
            Err(SyncError::ManifestNotLoaded)
        }
    }

    pub fn keys(&self) -> Result<Vec<String>, SyncError> {
        self.ensure_loaded()?;
        Ok(self.entries.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, SyncError> {
        self.ensure_loaded()?;
        Ok(self.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len()? == 0)
    }

    /// Raw `removed_at` string for `key`.
    pub fn get(&self, key: &str) -> Result<Option<&str>, SyncError> {
        self.ensure_loaded()?;
        Ok(self.entries.get(key).map(String::as_str))
    }

    pub fn set(&mut self, key: impl Into<String>, removed_at: DateTime<Utc>) -> Result<(), SyncError> {
        self.ensure_loaded()?;
        self.entries.insert(
            key.into(),
            removed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        self.changed = true;
        Ok(())
    }

    /// Remove an entry, returning its previous value. Removing an absent key is not a change.
    pub fn delete(&mut self, key: &str) -> Result<Option<String>, SyncError> {
        self.ensure_loaded()?;
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        Ok(removed)
    }

    pub fn entries(&self) -> Result<&BTreeMap<String, String>, SyncError> {
        self.ensure_loaded()?;
        Ok(&self.entries)
    }

    /// Parsed `removed_at` per key. Entries that are not RFC 3339 timestamps are logged
    /// and left out, so the retention pass treats them as first sightings.
    pub fn tombstones(&self) -> Result<HashMap<String, DateTime<Utc>>, SyncError> {
        self.ensure_loaded()?;
        let mut parsed = HashMap::with_capacity(self.entries.len());
        for (key, raw) in &self.entries {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => {
                    parsed.insert(key.clone(), ts.with_timezone(&Utc));
                }
                Err(e) => {
                    tracing::warn!("Ignoring unparsable removal time {raw:?} for {key}: {e}");
                }
            }
        }
        Ok(parsed)
    }
}

impl std::fmt::Debug for RemovalManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalManifest")
            .field("bucket", &self.store.bucket())
            .field("key", &self.key)
            .field("loaded", &self.loaded)
            .field("changed", &self.changed)
            .field("entries", &self.entries.len())
            .finish()
    }
}
