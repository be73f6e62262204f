use std::sync::Arc;

use depot_core::{group_by_logical_name, DefaultFingerprint, FingerprintScheme, LogicalGroup, PhysicalAsset};
use depot_store::{list_all, ObjectStore};

use crate::sync::SyncError;

/// Source of the physical assets currently present in the bucket.
#[async_trait::async_trait]
pub trait RemoteAssetCollector: Send + Sync {
    async fn assets(&self) -> Result<Vec<PhysicalAsset>, SyncError>;
}

/// Lists every object of an `ObjectStore`, skipping the removal manifest document.
pub struct StoreAssetCollector {
    store: Arc<dyn ObjectStore>,
    scheme: Arc<dyn FingerprintScheme>,
    manifest_key: String,
}

impl StoreAssetCollector {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            scheme: Arc::new(DefaultFingerprint),
            manifest_key: depot_config::REMOVAL_MANIFEST_KEY.to_string(),
        }
    }

    pub fn with_scheme(mut self, scheme: Arc<dyn FingerprintScheme>) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_manifest_key(mut self, key: impl Into<String>) -> Self {
        self.manifest_key = key.into();
        self
    }
}

#[async_trait::async_trait]
impl RemoteAssetCollector for StoreAssetCollector {
    async fn assets(&self) -> Result<Vec<PhysicalAsset>, SyncError> {
        let objects = list_all(self.store.as_ref()).await?;
        Ok(objects
            .into_iter()
            .filter(|o| o.key != self.manifest_key)
            .map(|o| PhysicalAsset::remote(o.key, o.last_modified, self.scheme.as_ref()))
            .collect())
    }
}

/// Session cache over a `RemoteAssetCollector`.
///
/// The first `assets()` call lists the bucket; later calls reuse that listing until
/// `clear_cache()`. Every upload or delete must be followed by `clear_cache()`.
pub struct RemoteInventory {
    collector: Box<dyn RemoteAssetCollector>,
    cached: Option<Vec<PhysicalAsset>>,
}

impl RemoteInventory {
    pub fn new(collector: Box<dyn RemoteAssetCollector>) -> Self {
        Self {
            collector,
            cached: None,
        }
    }

    pub async fn assets(&mut self) -> Result<&[PhysicalAsset], SyncError> {
        if self.cached.is_none() {
            let listed = self.collector.assets().await?;
            tracing::debug!("Listed {} remote assets", listed.len());
            self.cached = Some(listed);
        } else {
            tracing::debug!("Using cached remote listing");
        }
        Ok(self.cached.as_deref().unwrap_or_default())
    }

    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    pub async fn asset_paths(&mut self) -> Result<Vec<String>, SyncError> {
        Ok(self.assets().await?.iter().map(|a| a.key.clone()).collect())
    }

    /// Listing partitioned by logical name, both levels in listing order.
    pub async fn grouped_assets(&mut self) -> Result<Vec<LogicalGroup>, SyncError> {
        Ok(group_by_logical_name(self.assets().await?.iter().cloned()))
    }
}
