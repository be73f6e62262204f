pub mod sync;

use std::sync::Arc;

use camino::Utf8PathBuf;
use depot_store::FsObjectStore;

// Re-export core engine components
pub use sync::{
    default_policy, CleanOptions, CleanReport, DeployEngine, DeployOptions, DeployReport,
    SyncError, UploadOptions, UploadReport,
};

/// Engine over a directory bucket, publishing every asset found in `public_dir`.
pub fn default_engine(
    bucket_dir: impl Into<Utf8PathBuf>,
    public_dir: impl Into<Utf8PathBuf>,
) -> DeployEngine {
    let store = Arc::new(FsObjectStore::new(bucket_dir));
    let local = sync::DirectoryAssetCollector::new(public_dir);
    DeployEngine::new(store, Box::new(local))
}
