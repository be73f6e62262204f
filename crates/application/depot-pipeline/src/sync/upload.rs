use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use bytes::Bytes;
use camino::Utf8PathBuf;
use depot_core::content_type::content_type_for;
use depot_store::{ObjectStore, PutObject};
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::sync::SyncError;

/// Per-object headers supplied by the caller. Unset fields fall back to the defaults
/// in `resolve`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ObjectOptions {
    /// Build the write request for `key`, caller options winning over the defaults.
    pub fn resolve(&self, key: &str, body: Bytes) -> PutObject {
        PutObject {
            key: key.to_string(),
            body,
            content_type: Some(
                self.content_type
                    .clone()
                    .unwrap_or_else(|| content_type_for(key)),
            ),
            cache_control: Some(
                self.cache_control
                    .clone()
                    .unwrap_or_else(|| depot_config::DEFAULT_CACHE_CONTROL.to_string()),
            ),
            acl: self.acl.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub object: ObjectOptions,
    /// Parallel puts, clamped to the configured range.
    pub concurrency: usize,
    /// Upload throughput cap in bytes per second.
    pub rate_limit_bytes: Option<u64>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            object: ObjectOptions::default(),
            concurrency: depot_config::DEFAULT_UPLOAD_CONCURRENCY,
            rate_limit_bytes: None,
        }
    }
}

/// One asset to push, with the local file that backs it.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub key: String,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { key: String, bytes: u64 },
    /// The backing file does not exist. Not an error.
    Missing { key: String },
}

/// Pushes files into an `ObjectStore` with bounded parallelism.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    options: UploadOptions,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, options: UploadOptions) -> Self {
        Self { store, options }
    }

    /// Upload (or, with `dry_run`, only check) every item. Outcomes are returned in input
    /// order. A store failure fails the whole batch; puts already issued stay in place.
    pub async fn upload_batch(
        &self,
        items: Vec<UploadItem>,
        dry_run: bool,
    ) -> Result<Vec<UploadOutcome>, SyncError> {
        let limiter = self.options.rate_limit_bytes.and_then(|bps| {
            NonZeroU32::new(bps.min(u32::MAX as u64) as u32)
                .map(|nz| Arc::new(RateLimiter::direct(Quota::per_second(nz))))
        });
        let concurrency = depot_config::clamp_concurrency(self.options.concurrency);

        let mut results: Vec<(usize, UploadOutcome)> = stream::iter(items.into_iter().enumerate())
            .map(|(idx, item)| {
                let lim = limiter.clone();
                async move {
                    let outcome = self.upload_single(item, dry_run, lim).await?;
                    Ok::<_, SyncError>((idx, outcome))
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()?;

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, outcome)| outcome).collect())
    }

    async fn upload_single(
        &self,
        item: UploadItem,
        dry_run: bool,
        lim: Option<Arc<DefaultDirectRateLimiter>>,
    ) -> Result<UploadOutcome, SyncError> {
        if dry_run {
            return Ok(match tokio::fs::metadata(item.path.as_std_path()).await {
                Ok(meta) if meta.is_file() => UploadOutcome::Uploaded {
                    key: item.key,
                    bytes: meta.len(),
                },
                _ => {
                    tracing::warn!("Skipping {}: no local file at {}", item.key, item.path);
                    UploadOutcome::Missing { key: item.key }
                }
            });
        }

        let body = match tokio::fs::read(item.path.as_std_path()).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Skipping {}: no local file at {}", item.key, item.path);
                return Ok(UploadOutcome::Missing { key: item.key });
            }
            Err(e) => return Err(SyncError::Local(format!("read {}: {e}", item.path))),
        };

        if let Some(l) = &lim {
            throttle(l, body.len()).await;
        }

        let bytes = body.len() as u64;
        let request = self.options.object.resolve(&item.key, body);
        tracing::info!(
            key = %item.key,
            content_type = ?request.content_type,
            "Uploading {} ({} bytes)",
            item.key,
            bytes
        );
        self.store.put(request).await?;

        Ok(UploadOutcome::Uploaded {
            key: item.key,
            bytes,
        })
    }
}

/// Wait for `len` bytes of budget, in steps no larger than the limiter's burst.
async fn throttle(limiter: &DefaultDirectRateLimiter, len: usize) {
    let mut remaining = len as u64;
    while remaining > 0 {
        let mut step = remaining.min(u32::MAX as u64) as u32;
        loop {
            let Some(n) = NonZeroU32::new(step) else {
                return;
            };
            match limiter.until_n_ready(n).await {
                Ok(()) => break,
                // Larger than the burst: halve until it fits.
                Err(_) => step /= 2,
            }
        }
        remaining -= step as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_store::MemoryObjectStore;
    use std::fs;

    #[test]
    fn defaults_fill_unset_headers() {
        let put = ObjectOptions::default().resolve("assets/app-1.js.map", Bytes::new());
        assert_eq!(put.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            put.cache_control.as_deref(),
            Some(depot_config::DEFAULT_CACHE_CONTROL)
        );
        assert_eq!(put.acl, None);

        let put = ObjectOptions::default().resolve("blob-1.unknownext", Bytes::new());
        assert_eq!(put.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn caller_options_override_defaults() {
        let mut metadata = BTreeMap::new();
        metadata.insert("build".to_string(), "42".to_string());
        let options = ObjectOptions {
            content_type: Some("text/plain".into()),
            cache_control: Some("no-cache".into()),
            acl: Some("public-read".into()),
            metadata: metadata.clone(),
        };
        let put = options.resolve("app-1.js", Bytes::from_static(b"x"));
        assert_eq!(put.content_type.as_deref(), Some("text/plain"));
        assert_eq!(put.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(put.acl.as_deref(), Some("public-read"));
        assert_eq!(put.metadata, metadata);
    }

    fn items(dir: &tempfile::TempDir, keys: &[&str]) -> Vec<UploadItem> {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        keys.iter()
            .map(|k| UploadItem {
                key: k.to_string(),
                path: root.join(k),
            })
            .collect()
    }

    #[tokio::test]
    async fn uploads_in_parallel_and_reports_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            fs::write(dir.path().join(format!("f-{i}.txt")), vec![b'a'; i + 1]).unwrap();
        }
        let keys: Vec<String> = (0..8).map(|i| format!("f-{i}.txt")).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        let store = Arc::new(MemoryObjectStore::new("b"));
        let uploader = Uploader::new(
            store.clone(),
            UploadOptions {
                concurrency: 3,
                ..UploadOptions::default()
            },
        );
        let outcomes = uploader
            .upload_batch(items(&dir, &key_refs), false)
            .await
            .unwrap();

        let reported: Vec<_> = outcomes
            .iter()
            .map(|o| match o {
                UploadOutcome::Uploaded { key, .. } => key.clone(),
                UploadOutcome::Missing { key } => panic!("unexpected missing {key}"),
            })
            .collect();
        assert_eq!(reported, keys);
        assert_eq!(store.put_calls(), 8);
        assert_eq!(store.object("f-3.txt").unwrap().body.len(), 4);
    }

    #[tokio::test]
    async fn missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("present-1.css"), "body{}").unwrap();
        let store = Arc::new(MemoryObjectStore::new("b"));
        let uploader = Uploader::new(store.clone(), UploadOptions::default());

        let outcomes = uploader
            .upload_batch(items(&dir, &["gone-1.css", "present-1.css"]), false)
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                UploadOutcome::Missing {
                    key: "gone-1.css".into()
                },
                UploadOutcome::Uploaded {
                    key: "present-1.css".into(),
                    bytes: 6
                },
            ]
        );
        assert_eq!(store.keys(), vec!["present-1.css".to_string()]);
    }

    #[tokio::test]
    async fn dry_run_checks_files_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("present-1.css"), "body{}").unwrap();
        let store = Arc::new(MemoryObjectStore::new("b"));
        let uploader = Uploader::new(store.clone(), UploadOptions::default());

        let outcomes = uploader
            .upload_batch(items(&dir, &["gone-1.css", "present-1.css"]), true)
            .await
            .unwrap();
        assert!(matches!(outcomes[0], UploadOutcome::Missing { .. }));
        assert!(matches!(outcomes[1], UploadOutcome::Uploaded { .. }));
        assert_eq!(store.put_calls(), 0);
    }

    #[tokio::test]
    async fn rate_limited_upload_completes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big-1.bin"), vec![0u8; 4096]).unwrap();
        let store = Arc::new(MemoryObjectStore::new("b"));
        let uploader = Uploader::new(
            store.clone(),
            UploadOptions {
                rate_limit_bytes: Some(1 << 20),
                ..UploadOptions::default()
            },
        );
        uploader
            .upload_batch(items(&dir, &["big-1.bin"]), false)
            .await
            .unwrap();
        assert_eq!(store.object("big-1.bin").unwrap().body.len(), 4096);
    }
}
