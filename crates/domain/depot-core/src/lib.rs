use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

pub mod clock;
pub mod content_type;
pub mod diff;
pub mod fingerprint;
pub mod retention;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::{DefaultFingerprint, FingerprintFn, FingerprintScheme};

/// One concrete, fingerprinted object, either intended locally or present in the store.
///
/// Equality and hashing only look at `key`: a local and a remote instance of the same
/// object compare equal even though only the remote one carries a timestamp.
#[derive(Debug, Clone)]
pub struct PhysicalAsset {
    pub key: String,
    pub logical_name: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl PhysicalAsset {
    pub fn local(key: impl Into<String>, scheme: &dyn FingerprintScheme) -> Self {
        let key = key.into();
        let logical_name = fingerprint::logical_name(scheme, &key);
        Self {
            key,
            logical_name,
            last_modified: None,
        }
    }

    pub fn remote(
        key: impl Into<String>,
        last_modified: DateTime<Utc>,
        scheme: &dyn FingerprintScheme,
    ) -> Self {
        let key = key.into();
        let logical_name = fingerprint::logical_name(scheme, &key);
        Self {
            key,
            logical_name,
            last_modified: Some(last_modified),
        }
    }
}

impl PartialEq for PhysicalAsset {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PhysicalAsset {}

impl Hash for PhysicalAsset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for PhysicalAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// All physical assets sharing one logical name.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalGroup {
    pub logical_name: String,
    pub assets: Vec<PhysicalAsset>,
}

/// Partition assets by logical name.
///
/// Groups appear in the order their logical name is first seen, and each group keeps
/// the input order of its members.
pub fn group_by_logical_name<I>(assets: I) -> Vec<LogicalGroup>
where
    I: IntoIterator<Item = PhysicalAsset>,
{
    let mut groups: Vec<LogicalGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for asset in assets {
        match index.get(&asset.logical_name) {
            Some(&i) => groups[i].assets.push(asset),
            None => {
                index.insert(asset.logical_name.clone(), groups.len());
                groups.push(LogicalGroup {
                    logical_name: asset.logical_name.clone(),
                    assets: vec![asset],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn remote(key: &str) -> PhysicalAsset {
        let ts = Utc.with_ymd_and_hms(2018, 5, 1, 15, 38, 31).unwrap();
        PhysicalAsset::remote(key, ts, &DefaultFingerprint)
    }

    #[test]
    fn equality_is_by_key_only() {
        let local = PhysicalAsset::local("assets/app-abc123.js", &DefaultFingerprint);
        let remote = remote("assets/app-abc123.js");
        assert_eq!(local, remote);
        assert_eq!(local.logical_name, "assets/app.js");
        assert!(local.last_modified.is_none());
        assert!(remote.last_modified.is_some());
    }

    #[test]
    fn grouping_keeps_listing_order() {
        let groups = group_by_logical_name(vec![
            remote("assets/b-1.js"),
            remote("assets/a-1.js"),
            remote("assets/b-2.js"),
            remote("assets/a-2.js"),
        ]);

        let names: Vec<_> = groups.iter().map(|g| g.logical_name.as_str()).collect();
        assert_eq!(names, vec!["assets/b.js", "assets/a.js"]);

        let b_keys: Vec<_> = groups[0].assets.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(b_keys, vec!["assets/b-1.js", "assets/b-2.js"]);
    }

    #[test]
    fn grouping_empty_input_is_empty() {
        assert!(group_by_logical_name(Vec::new()).is_empty());
    }
}
