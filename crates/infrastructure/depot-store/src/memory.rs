use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use depot_core::{Clock, SystemClock};

use crate::{ListPage, ObjectStore, ObjectSummary, PutObject, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// An in-process bucket. Listing is key-ordered, timestamps come from the injected clock.
pub struct MemoryObjectStore {
    bucket: String,
    page_size: usize,
    max_delete_batch: usize,
    clock: Arc<dyn Clock>,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    put_log: Mutex<Vec<String>>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: depot_config::DEFAULT_LIST_PAGE_SIZE,
            max_delete_batch: depot_config::MAX_DELETE_BATCH,
            clock: Arc::new(SystemClock),
            objects: Mutex::new(BTreeMap::new()),
            put_log: Mutex::new(Vec::new()),
            put_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_delete_batch(mut self, max: usize) -> Self {
        self.max_delete_batch = max.max(1);
        self
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without counting it as a put.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        self.objects().insert(
            key.into(),
            StoredObject {
                body: body.into(),
                last_modified,
                content_type: None,
                cache_control: None,
                acl: None,
                metadata: BTreeMap::new(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    /// Keys written through `put`, in call order.
    pub fn put_log(&self) -> Vec<String> {
        self.put_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Total mutating calls (puts and delete batches).
    pub fn mutation_calls(&self) -> usize {
        self.put_calls() + self.delete_calls()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, continuation: Option<&str>) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects();
        let lower = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };

        let mut page: Vec<ObjectSummary> = objects
            .range((lower, Bound::Unbounded))
            .take(self.page_size + 1)
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                last_modified: obj.last_modified,
                size: obj.body.len() as u64,
            })
            .collect();

        let next = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next,
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.objects()
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, object: PutObject) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        self.put_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(object.key.clone());
        self.objects().insert(
            object.key,
            StoredObject {
                body: object.body,
                last_modified: now,
                content_type: object.content_type,
                cache_control: object.cache_control,
                acl: object.acl,
                metadata: object.metadata,
            },
        );
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if keys.len() > self.max_delete_batch {
            return Err(StoreError::Backend(format!(
                "delete batch of {} exceeds limit {}",
                keys.len(),
                self.max_delete_batch
            )));
        }
        let mut objects = self.objects();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    fn max_delete_batch(&self) -> usize {
        self.max_delete_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{delete_all, list_all};
    use chrono::TimeZone;
    use depot_core::ManualClock;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn list_all_follows_pages() {
        let store = MemoryObjectStore::new("test-bucket").with_page_size(2);
        for key in ["e", "a", "c", "b", "d"] {
            store.insert(key, Bytes::new(), ts());
        }

        let first = store.list_page(None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next.as_deref(), Some("b"));

        let all = list_all(&store).await.unwrap();
        let keys: Vec<_> = all.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(store.list_calls(), 4);
    }

    #[tokio::test]
    async fn exact_page_boundary_has_no_trailing_token() {
        let store = MemoryObjectStore::new("b").with_page_size(2);
        store.insert("a", Bytes::new(), ts());
        store.insert("b", Bytes::new(), ts());
        let page = store.list_page(None).await.unwrap();
        assert_eq!(page.objects.len(), 2);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn put_stamps_clock_time() {
        let clock = Arc::new(ManualClock::new(ts()));
        let store = MemoryObjectStore::new("b").with_clock(clock.clone());
        store
            .put(PutObject {
                key: "app-1.js".into(),
                body: Bytes::from_static(b"x"),
                content_type: Some("text/javascript".into()),
                ..PutObject::default()
            })
            .await
            .unwrap();

        let obj = store.object("app-1.js").unwrap();
        assert_eq!(obj.last_modified, ts());
        assert_eq!(obj.content_type.as_deref(), Some("text/javascript"));
        assert_eq!(store.put_log(), vec!["app-1.js".to_string()]);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryObjectStore::new("b");
        let err = store.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_all_chunks_to_limit() {
        let store = MemoryObjectStore::new("b").with_max_delete_batch(2);
        let keys: Vec<String> = (0..5).map(|i| format!("k{i}")).collect();
        for k in &keys {
            store.insert(k.clone(), Bytes::new(), ts());
        }

        let requests = delete_all(&store, &keys).await.unwrap();
        assert_eq!(requests, 3);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let store = MemoryObjectStore::new("b").with_max_delete_batch(1);
        let err = store
            .delete_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::StoreErrorKind::Backend);
    }
}
