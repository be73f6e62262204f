use chrono::TimeDelta;
use depot_core::diff::DuplicateLogicalName;
use depot_core::retention::RetentionPolicy;
use depot_store::StoreError;
use serde::Serialize;

pub mod engine;
pub mod local;
pub mod manifest;
pub mod remote;
pub mod upload;

pub use engine::DeployEngine;
pub use local::{DirectoryAssetCollector, LocalAssetCollector, StaticAssetCollector};
pub use manifest::RemovalManifest;
pub use remote::{RemoteAssetCollector, RemoteInventory, StoreAssetCollector};
pub use upload::{ObjectOptions, UploadItem, UploadOptions, UploadOutcome, Uploader};

/// High-level error type for deploy operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(
        "Duplicate assets detected ({}). Please make sure no two local assets share a logical name.",
        describe_duplicates(.duplicates)
    )]
    DuplicateAssets {
        duplicates: Vec<DuplicateLogicalName>,
    },
    #[error("Removal manifest accessed before it was loaded")]
    ManifestNotLoaded,
    #[error("Removal manifest is corrupt: {0}")]
    ManifestCorrupt(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Local asset error: {0}")]
    Local(String),
    #[error("Deploy hook failed: {0}")]
    Hook(String),
}

fn describe_duplicates(duplicates: &[DuplicateLogicalName]) -> String {
    duplicates
        .iter()
        .map(|d| format!("{} <- [{}]", d.logical_name, d.keys.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy)]
pub struct CleanOptions {
    pub policy: RetentionPolicy,
    pub dry_run: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeployOptions {
    pub policy: RetentionPolicy,
    pub dry_run: bool,
    /// Run `clean` after the upload and hook.
    pub clean: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            dry_run: false,
            clean: true,
        }
    }
}

pub fn default_policy() -> RetentionPolicy {
    RetentionPolicy {
        version_limit: depot_config::DEFAULT_VERSION_LIMIT,
        version_ttl: TimeDelta::seconds(depot_config::DEFAULT_VERSION_TTL_SECS as i64),
        removed_ttl: TimeDelta::seconds(depot_config::DEFAULT_REMOVED_TTL_SECS as i64),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    /// Keys uploaded, or that would have been in a dry run.
    pub uploaded: Vec<String>,
    /// Keys with no readable local file.
    pub skipped_missing: Vec<String>,
    /// Tombstones cancelled because their key is intended locally again.
    pub tombstones_cleared: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    /// Keys deleted, or that would have been in a dry run.
    pub deleted: Vec<String>,
    /// Retired keys tombstoned on this run.
    pub tombstoned: Vec<String>,
    /// Tombstoned keys still inside the removed TTL.
    pub pending: Vec<String>,
    /// Set when cleaning was refused because local assets still need uploading.
    pub refused: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    pub upload: UploadReport,
    pub clean: Option<CleanReport>,
}
