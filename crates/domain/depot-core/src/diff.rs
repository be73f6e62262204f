use crate::PhysicalAsset;
use std::collections::{HashMap, HashSet};

/// Two or more local assets resolving to one logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateLogicalName {
    pub logical_name: String,
    pub keys: Vec<String>,
}

/// Local assets whose key is not present remotely. Keeps local order.
pub fn assets_to_upload<'a, I>(local: &[PhysicalAsset], remote_keys: I) -> Vec<PhysicalAsset>
where
    I: IntoIterator<Item = &'a str>,
{
    let remote: HashSet<&str> = remote_keys.into_iter().collect();
    local
        .iter()
        .filter(|asset| !remote.contains(asset.key.as_str()))
        .cloned()
        .collect()
}

/// Every logical name claimed by more than one local asset, in first-seen order.
///
/// The same physical key listed twice counts as a duplicate as well.
pub fn find_duplicates(local: &[PhysicalAsset]) -> Vec<DuplicateLogicalName> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_name: HashMap<&str, Vec<String>> = HashMap::new();

    for asset in local {
        let keys = by_name.entry(asset.logical_name.as_str()).or_insert_with(|| {
            order.push(asset.logical_name.as_str());
            Vec::new()
        });
        keys.push(asset.key.clone());
    }

    order
        .into_iter()
        .filter_map(|name| {
            let keys = by_name.remove(name)?;
            (keys.len() > 1).then(|| DuplicateLogicalName {
                logical_name: name.to_string(),
                keys,
            })
        })
        .collect()
}

/// Tombstoned keys that are intended locally again, in `tombstoned` order.
///
/// A key comes back either as itself or through its logical name: once `x.js` is part of
/// the build again, a tombstone on an older `x-1.js` is void and that version falls back
/// under the version rules. `remote` supplies the logical names of stored keys.
pub fn reappeared<'a, I>(
    tombstoned: I,
    local: &[PhysicalAsset],
    remote: &[PhysicalAsset],
) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let local_keys: HashSet<&str> = local.iter().map(|a| a.key.as_str()).collect();
    let local_names: HashSet<&str> = local.iter().map(|a| a.logical_name.as_str()).collect();
    let remote_names: HashMap<&str, &str> = remote
        .iter()
        .map(|a| (a.key.as_str(), a.logical_name.as_str()))
        .collect();

    tombstoned
        .into_iter()
        .filter(|key| {
            local_keys.contains(key)
                || remote_names
                    .get(key)
                    .is_some_and(|name| local_names.contains(name))
        })
        .map(str::to_string)
        .collect()
}
