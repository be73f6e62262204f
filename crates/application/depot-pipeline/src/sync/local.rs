use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use depot_core::{DefaultFingerprint, FingerprintScheme, PhysicalAsset};
use walkdir::WalkDir;

use crate::sync::SyncError;

/// Source of the physical assets the current build intends to serve.
#[async_trait::async_trait]
pub trait LocalAssetCollector: Send + Sync {
    async fn assets(&self) -> Result<Vec<PhysicalAsset>, SyncError>;

    /// Local file backing `asset`, if it can be resolved. The file may still be missing.
    fn full_path(&self, asset: &PhysicalAsset) -> Option<Utf8PathBuf>;

    async fn asset_paths(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.assets().await?.into_iter().map(|a| a.key).collect())
    }

    async fn original_asset_paths(&self) -> Result<Vec<String>, SyncError> {
        Ok(self
            .assets()
            .await?
            .into_iter()
            .map(|a| a.logical_name)
            .collect())
    }

    /// Logical name to physical asset. Only meaningful once duplicates were ruled out.
    async fn asset_map(&self) -> Result<HashMap<String, PhysicalAsset>, SyncError> {
        Ok(self
            .assets()
            .await?
            .into_iter()
            .map(|a| (a.logical_name.clone(), a))
            .collect())
    }
}

/// Every regular file below a public directory, keyed by its `/`-separated relative path.
///
/// Precompressed `.gz` siblings and build-tool `manifest.json` files are not assets, and
/// neither is a file sitting at the removal manifest's key.
pub struct DirectoryAssetCollector {
    root: Utf8PathBuf,
    prefixes: Vec<String>,
    manifest_key: String,
    scheme: Arc<dyn FingerprintScheme>,
}

impl DirectoryAssetCollector {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefixes: Vec::new(),
            manifest_key: depot_config::REMOVAL_MANIFEST_KEY.to_string(),
            scheme: Arc::new(DefaultFingerprint),
        }
    }

    /// Only keep keys starting with one of `prefixes`. Empty means everything.
    pub fn with_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    pub fn with_scheme(mut self, scheme: Arc<dyn FingerprintScheme>) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_manifest_key(mut self, key: impl Into<String>) -> Self {
        self.manifest_key = key.into();
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn is_asset(key: &str, manifest_key: &str) -> bool {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        key != manifest_key && !file_name.ends_with(".gz") && file_name != "manifest.json"
    }

    fn scan(
        root: &Utf8Path,
        prefixes: &[String],
        manifest_key: &str,
    ) -> Result<Vec<String>, SyncError> {
        if !root.is_dir() {
            return Err(SyncError::Local(format!("public directory not found: {root}")));
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| SyncError::Local(format!("walk {root}: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|p| SyncError::Local(format!("non-utf8 path: {}", p.display())))?;
            let rel = path
                .strip_prefix(root)
                .map_err(|e| SyncError::Local(e.to_string()))?;
            let key = rel.as_str().replace('\\', "/");

            if !Self::is_asset(&key, manifest_key) {
                continue;
            }
            if !prefixes.is_empty() && !prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                continue;
            }
            keys.push(key);
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl LocalAssetCollector for DirectoryAssetCollector {
    async fn assets(&self) -> Result<Vec<PhysicalAsset>, SyncError> {
        let root = self.root.clone();
        let prefixes = self.prefixes.clone();
        let manifest_key = self.manifest_key.clone();
        let keys =
            tokio::task::spawn_blocking(move || Self::scan(&root, &prefixes, &manifest_key))
                .await
                .map_err(|e| SyncError::Local(format!("scan join failed: {e}")))??;

        Ok(keys
            .into_iter()
            .map(|key| PhysicalAsset::local(key, self.scheme.as_ref()))
            .collect())
    }

    fn full_path(&self, asset: &PhysicalAsset) -> Option<Utf8PathBuf> {
        Some(self.root.join(&asset.key))
    }
}

/// A fixed `(key, file)` list produced by some external build step.
pub struct StaticAssetCollector {
    entries: Vec<(String, Utf8PathBuf)>,
    scheme: Arc<dyn FingerprintScheme>,
}

impl StaticAssetCollector {
    pub fn new<K, P>(entries: impl IntoIterator<Item = (K, P)>) -> Self
    where
        K: Into<String>,
        P: Into<Utf8PathBuf>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
            scheme: Arc::new(DefaultFingerprint),
        }
    }

    pub fn with_scheme(mut self, scheme: Arc<dyn FingerprintScheme>) -> Self {
        self.scheme = scheme;
        self
    }
}

#[async_trait::async_trait]
impl LocalAssetCollector for StaticAssetCollector {
    async fn assets(&self) -> Result<Vec<PhysicalAsset>, SyncError> {
        Ok(self
            .entries
            .iter()
            .map(|(key, _)| PhysicalAsset::local(key.clone(), self.scheme.as_ref()))
            .collect())
    }

    fn full_path(&self, asset: &PhysicalAsset) -> Option<Utf8PathBuf> {
        self.entries
            .iter()
            .find(|(key, _)| *key == asset.key)
            .map(|(_, path)| path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::FingerprintFn;
    use std::fs;

    fn public_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        for rel in [
            "assets/app-abc123.js",
            "assets/app-abc123.js.gz",
            "assets/manifest.json",
            "packs/vendor-9f8e7d.css",
            "favicon.ico",
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, rel).unwrap();
        }
        (dir, root)
    }

    #[tokio::test]
    async fn directory_collector_skips_non_assets() {
        let (_dir, root) = public_dir();
        let collector = DirectoryAssetCollector::new(root.clone());

        let paths = collector.asset_paths().await.unwrap();
        assert_eq!(
            paths,
            vec![
                "assets/app-abc123.js".to_string(),
                "favicon.ico".to_string(),
                "packs/vendor-9f8e7d.css".to_string(),
            ]
        );

        let originals = collector.original_asset_paths().await.unwrap();
        assert_eq!(originals[0], "assets/app.js");
        assert_eq!(originals[2], "packs/vendor.css");

        let map = collector.asset_map().await.unwrap();
        let app = &map["assets/app.js"];
        assert_eq!(collector.full_path(app), Some(root.join("assets/app-abc123.js")));
    }

    #[tokio::test]
    async fn directory_collector_filters_prefixes() {
        let (_dir, root) = public_dir();
        let collector = DirectoryAssetCollector::new(root)
            .with_prefixes(vec!["assets/".into(), "packs/".into()]);
        let paths = collector.asset_paths().await.unwrap();
        assert_eq!(
            paths,
            vec![
                "assets/app-abc123.js".to_string(),
                "packs/vendor-9f8e7d.css".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn removal_manifest_is_never_a_local_asset() {
        let (_dir, root) = public_dir();
        fs::write(root.join(depot_config::REMOVAL_MANIFEST_KEY), "{}").unwrap();
        fs::write(root.join("ledger.json"), "{}").unwrap();

        let paths = DirectoryAssetCollector::new(root.clone())
            .asset_paths()
            .await
            .unwrap();
        assert!(!paths.contains(&depot_config::REMOVAL_MANIFEST_KEY.to_string()));
        assert!(paths.contains(&"ledger.json".to_string()));

        let paths = DirectoryAssetCollector::new(root)
            .with_manifest_key("ledger.json")
            .asset_paths()
            .await
            .unwrap();
        assert!(!paths.contains(&"ledger.json".to_string()));
        assert!(paths.contains(&depot_config::REMOVAL_MANIFEST_KEY.to_string()));
    }

    #[tokio::test]
    async fn missing_public_dir_is_a_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("missing")).unwrap();
        let err = DirectoryAssetCollector::new(root).assets().await.unwrap_err();
        assert!(matches!(err, SyncError::Local(_)));
    }

    #[tokio::test]
    async fn static_collector_resolves_paths_and_custom_scheme() {
        let scheme = FingerprintFn(|key: &str| key.strip_prefix("v2/").map(str::to_string));
        let collector = StaticAssetCollector::new([
            ("v2/app.js", "/build/app.js"),
            ("other.js", "/build/other.js"),
        ])
        .with_scheme(Arc::new(scheme));

        let assets = collector.assets().await.unwrap();
        assert_eq!(assets[0].logical_name, "app.js");
        assert_eq!(assets[1].logical_name, "other.js");
        assert_eq!(
            collector.full_path(&assets[1]),
            Some(Utf8PathBuf::from("/build/other.js"))
        );

        let unknown = PhysicalAsset::local("nope-1.js", &DefaultFingerprint);
        assert_eq!(collector.full_path(&unknown), None);
    }
}
