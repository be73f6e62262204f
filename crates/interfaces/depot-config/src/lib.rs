//! Central configuration constants for retention, upload and store defaults.

/// Non-current versions kept per active logical name regardless of age.
pub const DEFAULT_VERSION_LIMIT: usize = 2;

/// Non-current versions younger than this (seconds) are never deleted. 1 hour.
pub const DEFAULT_VERSION_TTL_SECS: u64 = 60 * 60;

/// Grace period (seconds) between tombstoning a retired asset and deleting it. 48 hours.
pub const DEFAULT_REMOVED_TTL_SECS: u64 = 48 * 60 * 60;

/// Cache-Control header for uploaded assets. Fingerprinted keys never change content.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Store key of the removal manifest document.
pub const REMOVAL_MANIFEST_KEY: &str = "depot-removal-manifest.json";

/// Maximum keys per delete request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Objects returned per listing page by the bundled stores.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Default number of concurrent uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Minimum allowed concurrent uploads.
pub const MIN_UPLOAD_CONCURRENCY: usize = 1;

/// Maximum allowed concurrent uploads.
pub const MAX_UPLOAD_CONCURRENCY: usize = 32;

/// Convenience function to clamp a concurrency value into allowed range.
pub fn clamp_concurrency(v: usize) -> usize {
    v.clamp(MIN_UPLOAD_CONCURRENCY, MAX_UPLOAD_CONCURRENCY)
}
