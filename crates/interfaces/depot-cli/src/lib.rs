pub mod commands;
pub mod settings;

use camino::Utf8PathBuf;
use clap::Args;

pub use settings::Settings;

/// Where to publish from and to, after merging flags with the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub bucket_dir: Utf8PathBuf,
    pub public_dir: Utf8PathBuf,
    pub prefixes: Vec<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct RetentionArgs {
    /// Old versions kept per asset regardless of age
    #[arg(long)]
    pub version_limit: Option<usize>,
    /// Seconds an old version is kept regardless of the version limit
    #[arg(long, value_name = "SECS")]
    pub version_ttl: Option<u64>,
    /// Seconds between marking a removed asset and deleting it
    #[arg(long, value_name = "SECS")]
    pub removed_ttl: Option<u64>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct TransferArgs {
    /// Parallel uploads
    #[arg(short, long)]
    pub concurrency: Option<usize>,
    /// Upload rate limit in KiB/s
    #[arg(long)]
    pub limit_kb: Option<u64>,
}
