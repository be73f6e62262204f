use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::key::validate_key;
use crate::{ListPage, ObjectStore, ObjectSummary, PutObject, StoreError};

const TMP_SUFFIX: &str = ".depot-tmp";

/// A local directory used as a bucket: keys are `/`-separated paths below `root`.
///
/// A filesystem has nowhere to keep per-object headers, so content type, cache control,
/// ACL and metadata of a put are dropped.
pub struct FsObjectStore {
    root: Utf8PathBuf,
    bucket: String,
    page_size: usize,
}

impl FsObjectStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root = root.into();
        let bucket = root.file_name().unwrap_or("bucket").to_string();
        Self {
            root,
            bucket,
            page_size: depot_config::DEFAULT_LIST_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<Utf8PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn scan(root: &Utf8Path) -> Result<Vec<ObjectSummary>, StoreError> {
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| StoreError::Backend(format!("walk {root}: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|p| StoreError::Backend(format!("non-utf8 path: {}", p.display())))?;
            if path.as_str().ends_with(TMP_SUFFIX) {
                continue;
            }
            let rel = path
                .strip_prefix(root)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let key = rel.as_str().replace('\\', "/");

            let meta = std::fs::metadata(&path)?;
            let last_modified: DateTime<Utc> = meta.modified()?.into();
            objects.push(ObjectSummary {
                key,
                last_modified,
                size: meta.len(),
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn scan_root(&self) -> Result<Vec<ObjectSummary>, StoreError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::scan(&root))
            .await
            .map_err(|e| StoreError::Backend(format!("listing join failed: {e}")))?
    }

    async fn prune_empty_parents(&self, path: &Utf8Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root.as_path() || !d.starts_with(&self.root) {
                break;
            }
            // Fails (and stops) on the first non-empty directory.
            if tokio::fs::remove_dir(d.as_std_path()).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    // Each page walks the tree again, so paging callers should prefer `list_all`.
    async fn list_page(&self, continuation: Option<&str>) -> Result<ListPage, StoreError> {
        let all = self.scan_root().await?;

        let mut page: Vec<ObjectSummary> = all
            .into_iter()
            .filter(|o| continuation.map_or(true, |token| o.key.as_str() > token))
            .take(self.page_size + 1)
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

    /// One walk for the whole bucket instead of one per page.
    async fn list_all(&self) -> Result<Vec<ObjectSummary>, StoreError> {
        self.scan_root().await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(path.as_std_path()).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, object: PutObject) -> Result<(), StoreError> {
        let path = self.object_path(&object.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent.as_std_path()).await?;
        }

        tracing::debug!(
            key = %object.key,
            content_type = ?object.content_type,
            cache_control = ?object.cache_control,
            "writing object (headers are not persisted by directory stores)"
        );

        // Atomic write
        let tmp = Utf8PathBuf::from(format!("{path}{TMP_SUFFIX}"));
        tokio::fs::write(tmp.as_std_path(), &object.body).await?;
        tokio::fs::rename(tmp.as_std_path(), path.as_std_path()).await?;
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.len() > self.max_delete_batch() {
            return Err(StoreError::Backend(format!(
                "delete batch of {} exceeds limit {}",
                keys.len(),
                self.max_delete_batch()
            )));
        }
        for key in keys {
            let path = self.object_path(key)?;
            match tokio::fs::remove_file(path.as_std_path()).await {
                Ok(()) => self.prune_empty_parents(&path).await,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
