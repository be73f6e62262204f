use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::TimeDelta;
use depot_core::retention::RetentionPolicy;
use depot_pipeline::sync::{ObjectOptions, UploadOptions};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;

use crate::{RetentionArgs, Target, TransferArgs};

const QUALIFIER: &str = "com";
const ORG: &str = "depot";
const APP: &str = "depot";
const SETTINGS_FILE: &str = "depot.json";

/// Optional JSON settings file. Every field can also be given on the command line,
/// and the command line wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bucket_dir: Option<String>,
    pub public_dir: Option<String>,
    pub prefixes: Vec<String>,
    pub version_limit: Option<usize>,
    pub version_ttl_secs: Option<u64>,
    pub removed_ttl_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub limit_kb: Option<u64>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub after_upload: Option<String>,
}

impl Settings {
    /// Per-user settings location, e.g. `~/.config/depot/depot.json` on Linux.
    pub fn default_path() -> Option<Utf8PathBuf> {
        let dirs = ProjectDirs::from(QUALIFIER, ORG, APP)?;
        Utf8PathBuf::from_path_buf(dirs.config_dir().join(SETTINGS_FILE)).ok()
    }

    /// Load `explicit` (which must exist) or, failing that, the per-user file if present.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_owned(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read settings {path}"))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {path}"))?;
        tracing::debug!("Loaded settings from {}", path);
        Ok(settings)
    }

    pub fn target(
        &self,
        bucket_dir: Option<Utf8PathBuf>,
        public_dir: Option<Utf8PathBuf>,
        prefixes: Vec<String>,
    ) -> Result<Target> {
        let bucket_dir = bucket_dir
            .or_else(|| self.bucket_dir.as_deref().map(Utf8PathBuf::from))
            .ok_or_else(|| anyhow!("--bucket-dir is required (or set bucket_dir in the settings file)"))?;
        let public_dir = public_dir
            .or_else(|| self.public_dir.as_deref().map(Utf8PathBuf::from))
            .ok_or_else(|| anyhow!("--public-dir is required (or set public_dir in the settings file)"))?;
        let prefixes = if prefixes.is_empty() {
            self.prefixes.clone()
        } else {
            prefixes
        };

        Ok(Target {
            bucket_dir,
            public_dir,
            prefixes,
        })
    }

    pub fn policy(&self, args: &RetentionArgs) -> RetentionPolicy {
        let version_ttl = args
            .version_ttl
            .or(self.version_ttl_secs)
            .unwrap_or(depot_config::DEFAULT_VERSION_TTL_SECS);
        let removed_ttl = args
            .removed_ttl
            .or(self.removed_ttl_secs)
            .unwrap_or(depot_config::DEFAULT_REMOVED_TTL_SECS);

        RetentionPolicy {
            version_limit: args
                .version_limit
                .or(self.version_limit)
                .unwrap_or(depot_config::DEFAULT_VERSION_LIMIT),
            version_ttl: secs(version_ttl),
            removed_ttl: secs(removed_ttl),
        }
    }

    pub fn upload_options(&self, args: &TransferArgs) -> UploadOptions {
        UploadOptions {
            object: ObjectOptions {
                cache_control: self.cache_control.clone(),
                acl: self.acl.clone(),
                ..ObjectOptions::default()
            },
            concurrency: depot_config::clamp_concurrency(
                args.concurrency
                    .or(self.concurrency)
                    .unwrap_or(depot_config::DEFAULT_UPLOAD_CONCURRENCY),
            ),
            rate_limit_bytes: args
                .limit_kb
                .or(self.limit_kb)
                .map(|kb| kb.saturating_mul(1024)),
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(value.min(i64::MAX as u64) as i64)
}
