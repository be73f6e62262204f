//! Object store abstraction plus the bundled in-memory and directory-backed buckets.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

mod error;
pub mod fs;
pub mod key;
pub mod memory;

pub use error::{StoreError, StoreErrorKind};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Continuation token for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// A fully resolved write request.
#[derive(Debug, Clone, Default)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn list_page(&self, continuation: Option<&str>) -> Result<ListPage, StoreError>;

    /// Returns `StoreError::NotFound` when the key is absent.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn put(&self, object: PutObject) -> Result<(), StoreError>;

    /// Delete up to `max_delete_batch()` keys. Absent keys are not an error.
    async fn delete_batch(&self, keys: &[String]) -> Result<(), StoreError>;

    fn max_delete_batch(&self) -> usize {
        depot_config::MAX_DELETE_BATCH
    }

    /// The whole listing. Follows continuation tokens until exhausted unless a backend
    /// can do better.
    async fn list_all(&self) -> Result<Vec<ObjectSummary>, StoreError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(token.as_deref()).await?;
            objects.extend(page.objects);
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(objects)
    }
}

pub async fn list_all(store: &dyn ObjectStore) -> Result<Vec<ObjectSummary>, StoreError> {
    store.list_all().await
}

/// Delete `keys` in chunks of the store's per-request maximum. Returns the number of
/// requests issued.
pub async fn delete_all(store: &dyn ObjectStore, keys: &[String]) -> Result<usize, StoreError> {
    let chunk = store.max_delete_batch().max(1);
    let mut requests = 0;
    for batch in keys.chunks(chunk) {
        store.delete_batch(batch).await?;
        requests += 1;
    }
    Ok(requests)
}
