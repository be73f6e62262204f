use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use depot_core::diff::{assets_to_upload, find_duplicates, reappeared};
use depot_core::retention::{plan_retention, RetentionPlan, Verdict};
use depot_core::{Clock, PhysicalAsset, SystemClock};
use depot_store::{delete_all, ObjectStore};

use crate::sync::local::LocalAssetCollector;
use crate::sync::manifest::RemovalManifest;
use crate::sync::remote::{RemoteAssetCollector, RemoteInventory, StoreAssetCollector};
use crate::sync::upload::{UploadItem, UploadOptions, UploadOutcome, Uploader};
use crate::sync::{CleanOptions, CleanReport, DeployOptions, DeployReport, SyncError, UploadReport};

/// Uploads the locally built assets and garbage-collects superseded versions.
///
/// One engine is one session: the removal manifest is loaded at most once and the remote
/// listing is cached until the engine itself mutates the bucket.
pub struct DeployEngine {
    store: Arc<dyn ObjectStore>,
    local: Box<dyn LocalAssetCollector>,
    remote: RemoteInventory,
    manifest: RemovalManifest,
    clock: Arc<dyn Clock>,
    upload_options: UploadOptions,
}

impl DeployEngine {
    pub fn new(store: Arc<dyn ObjectStore>, local: Box<dyn LocalAssetCollector>) -> Self {
        let remote = Box::new(StoreAssetCollector::new(store.clone()));
        Self::with_components(store, local, remote, Arc::new(SystemClock))
    }

    pub fn with_components(
        store: Arc<dyn ObjectStore>,
        local: Box<dyn LocalAssetCollector>,
        remote: Box<dyn RemoteAssetCollector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            manifest: RemovalManifest::new(store.clone()),
            remote: RemoteInventory::new(remote),
            store,
            local,
            clock,
            upload_options: UploadOptions::default(),
        }
    }

    pub fn with_upload_options(mut self, options: UploadOptions) -> Self {
        self.upload_options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn local(&self) -> &dyn LocalAssetCollector {
        self.local.as_ref()
    }

    pub fn remote(&mut self) -> &mut RemoteInventory {
        &mut self.remote
    }

    pub fn manifest(&self) -> &RemovalManifest {
        &self.manifest
    }

    pub fn manifest_mut(&mut self) -> &mut RemovalManifest {
        &mut self.manifest
    }

    /// Local assets, after checking that no two of them share a logical name.
    pub async fn verify_no_duplicate_assets(&self) -> Result<Vec<PhysicalAsset>, SyncError> {
        let local = self.local.assets().await?;
        let duplicates = find_duplicates(&local);
        if !duplicates.is_empty() {
            return Err(SyncError::DuplicateAssets { duplicates });
        }
        Ok(local)
    }

    /// Local assets whose key is not yet in the bucket.
    pub async fn local_assets_to_upload(&mut self) -> Result<Vec<PhysicalAsset>, SyncError> {
        let local = self.local.assets().await?;
        self.pending_uploads(&local).await
    }

    async fn pending_uploads(
        &mut self,
        local: &[PhysicalAsset],
    ) -> Result<Vec<PhysicalAsset>, SyncError> {
        let remote = self.remote.assets().await?;
        Ok(assets_to_upload(local, remote.iter().map(|a| a.key.as_str())))
    }

    /// Push every local asset missing from the bucket. With `dry_run` nothing is written
    /// but the report lists what would have been.
    pub async fn upload(&mut self, dry_run: bool) -> Result<UploadReport, SyncError> {
        let result = self.upload_inner(dry_run).await;
        self.remote.clear_cache();
        result
    }

    async fn upload_inner(&mut self, dry_run: bool) -> Result<UploadReport, SyncError> {
        let local = self.verify_no_duplicate_assets().await?;
        self.manifest.load().await?;
        let to_upload = self.pending_uploads(&local).await?;

        let mut report = UploadReport {
            dry_run,
            ..UploadReport::default()
        };

        // A tombstoned key whose logical name is part of the build again was restored.
        let tombstoned = self.manifest.keys()?;
        let restored = {
            let remote = self.remote.assets().await?;
            reappeared(tombstoned.iter().map(String::as_str), &local, remote)
        };
        for key in restored {
            tracing::info!("Cancelling removal of {}, it is part of the build again", key);
            if !dry_run {
                self.manifest.delete(&key)?;
            }
            report.tombstones_cleared.push(key);
        }

        let mut items = Vec::with_capacity(to_upload.len());
        for asset in to_upload {
            match self.local.full_path(&asset) {
                Some(path) => items.push(UploadItem {
                    key: asset.key,
                    path,
                }),
                None => {
                    tracing::warn!("Skipping {}: no local file resolved", asset.key);
                    report.skipped_missing.push(asset.key);
                }
            }
        }

        let uploader = Uploader::new(self.store.clone(), self.upload_options.clone());
        for outcome in uploader.upload_batch(items, dry_run).await? {
            match outcome {
                UploadOutcome::Uploaded { key, .. } => report.uploaded.push(key),
                UploadOutcome::Missing { key } => report.skipped_missing.push(key),
            }
        }

        if !dry_run {
            self.manifest.save().await?;
        }

        tracing::info!(
            "Upload finished: {} uploaded, {} skipped{}",
            report.uploaded.len(),
            report.skipped_missing.len(),
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }

    /// Apply the retention policy to every logical name in the bucket.
    ///
    /// Refuses (and reports `refused`) while local assets still await upload: the newest
    /// build would otherwise be judged against a bucket that does not contain it yet.
    pub async fn clean(&mut self, options: &CleanOptions) -> Result<CleanReport, SyncError> {
        let result = self.clean_inner(options).await;
        self.remote.clear_cache();
        result
    }

    async fn clean_inner(&mut self, options: &CleanOptions) -> Result<CleanReport, SyncError> {
        let dry_run = options.dry_run;
        let local = self.verify_no_duplicate_assets().await?;

        let pending = self.pending_uploads(&local).await?;
        if !pending.is_empty() {
            tracing::warn!(
                "Refusing to clean: {} local assets have not been uploaded yet (run upload first)",
                pending.len()
            );
            return Ok(CleanReport {
                refused: true,
                dry_run,
                ..CleanReport::default()
            });
        }

        self.manifest.load().await?;
        let now = self.clock.now();
        let plan = self.plan(&local, options, now).await?;

        for group in &plan.groups {
            if let Some(current) = &group.current {
                // Tombstones only belong to retired names. A stale one would later expire
                // its key without a fresh grace period.
                let active_keys =
                    std::iter::once(current).chain(group.decisions.iter().map(|d| &d.key));
                for key in active_keys {
                    if self.manifest.get(key)?.is_some() {
                        tracing::debug!(
                            "Dropping stale removal mark on {}, {} is active",
                            key,
                            group.logical_name
                        );
                        if !dry_run {
                            self.manifest.delete(key)?;
                        }
                    }
                }
            }

            for decision in &group.decisions {
                match decision.verdict {
                    Verdict::Keep(reason) => {
                        tracing::debug!(
                            "Keeping {} ({:?}, rank {})",
                            decision.key,
                            reason,
                            decision.rank
                        );
                    }
                    Verdict::Tombstone => {
                        tracing::info!(
                            "{} is no longer part of the build, marking it for removal",
                            decision.key
                        );
                        if !dry_run {
                            self.manifest.set(decision.key.clone(), now)?;
                        }
                    }
                    Verdict::Expire => {
                        if !dry_run {
                            self.manifest.delete(&decision.key)?;
                        }
                    }
                    Verdict::Delete => {}
                }
            }
        }

        let deleted = plan.deletions();
        for key in &deleted {
            tracing::info!("Deleting {}", key);
        }
        if !deleted.is_empty() && !dry_run {
            let requests = delete_all(self.store.as_ref(), &deleted).await?;
            tracing::debug!("Deleted {} objects in {} requests", deleted.len(), requests);
        }

        if !dry_run {
            self.manifest.save().await?;
        }

        Ok(CleanReport {
            deleted,
            tombstoned: plan.tombstones(),
            pending: plan.pending(),
            refused: false,
            dry_run,
        })
    }

    async fn plan(
        &mut self,
        local: &[PhysicalAsset],
        options: &CleanOptions,
        now: DateTime<Utc>,
    ) -> Result<RetentionPlan, SyncError> {
        let groups = self.remote.grouped_assets().await?;
        let current: HashMap<String, PhysicalAsset> = local
            .iter()
            .map(|a| (a.logical_name.clone(), a.clone()))
            .collect();
        let tombstones = self.manifest.tombstones()?;

        Ok(plan_retention(
            &groups,
            &current,
            &tombstones,
            &options.policy,
            now,
        ))
    }

    /// `upload`, then `hook`, then `clean` unless disabled. A failing hook stops the run
    /// before anything is cleaned.
    pub async fn deploy<F>(
        &mut self,
        options: &DeployOptions,
        hook: F,
    ) -> Result<DeployReport, SyncError>
    where
        F: FnOnce(&UploadReport) -> Result<(), String>,
    {
        let upload = self.upload(options.dry_run).await?;
        hook(&upload).map_err(SyncError::Hook)?;

        let clean = if options.clean {
            Some(
                self.clean(&CleanOptions {
                    policy: options.policy,
                    dry_run: options.dry_run,
                })
                .await?,
            )
        } else {
            None
        };

        Ok(DeployReport { upload, clean })
    }
}
