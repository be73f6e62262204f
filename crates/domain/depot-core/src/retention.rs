//! Retention planning for remote asset versions.
//!
//! Pure decision logic: no I/O, no manifest mutation. The caller applies the
//! verdicts (recording or clearing tombstones, deleting objects).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{LogicalGroup, PhysicalAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Non-current versions kept regardless of age, newest first.
    pub version_limit: usize,
    /// Non-current versions younger than this are never deleted.
    pub version_ttl: TimeDelta,
    /// Grace period between tombstoning a retired asset and deleting it.
    pub removed_ttl: TimeDelta,
}

/// Source of `removed_at` timestamps for tombstoned keys.
pub trait TombstoneLookup {
    fn removed_at(&self, key: &str) -> Option<DateTime<Utc>>;
}

impl TombstoneLookup for HashMap<String, DateTime<Utc>> {
    fn removed_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key).copied()
    }
}

impl TombstoneLookup for BTreeMap<String, DateTime<Utc>> {
    fn removed_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// Younger than the version TTL.
    Recent,
    /// Among the `version_limit` newest non-current versions.
    WithinVersionLimit,
    /// Tombstoned, removed TTL not yet elapsed.
    AwaitingRemoval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep(KeepReason),
    /// First sighting of a retired asset: record `removed_at = now` and keep it.
    Tombstone,
    /// Out of the retention window of an active logical name.
    Delete,
    /// Tombstone outlived the removed TTL: clear the entry and delete.
    Expire,
}

impl Verdict {
    pub fn deletes(&self) -> bool {
        matches!(self, Verdict::Delete | Verdict::Expire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDecision {
    pub key: String,
    /// Position among the group's non-current versions, newest first.
    pub rank: usize,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub logical_name: String,
    pub current: Option<String>,
    pub decisions: Vec<CandidateDecision>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub groups: Vec<GroupPlan>,
}

impl RetentionPlan {
    fn keys_where(&self, pred: impl Fn(&Verdict) -> bool) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| g.decisions.iter())
            .filter(|d| pred(&d.verdict))
            .map(|d| d.key.clone())
            .collect()
    }

    /// Keys to delete from the store, grouped in listing order.
    pub fn deletions(&self) -> Vec<String> {
        self.keys_where(Verdict::deletes)
    }

    pub fn tombstones(&self) -> Vec<String> {
        self.keys_where(|v| *v == Verdict::Tombstone)
    }

    pub fn expired(&self) -> Vec<String> {
        self.keys_where(|v| *v == Verdict::Expire)
    }

    pub fn pending(&self) -> Vec<String> {
        self.keys_where(|v| *v == Verdict::Keep(KeepReason::AwaitingRemoval))
    }
}

fn age(asset: &PhysicalAsset, now: DateTime<Utc>) -> TimeDelta {
    // A remote listing always carries a timestamp; an unknown one counts as brand new.
    asset
        .last_modified
        .map(|ts| now - ts)
        .unwrap_or_else(TimeDelta::zero)
        .max(TimeDelta::zero())
}

/// Decide the fate of every non-current version in one logical group.
///
/// Each candidate is judged independently; the only ordering input is its rank among
/// the non-current versions sorted newest first.
pub fn plan_group(
    group: &LogicalGroup,
    current: Option<&PhysicalAsset>,
    tombstones: &dyn TombstoneLookup,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> GroupPlan {
    let mut candidates: Vec<&PhysicalAsset> = group
        .assets
        .iter()
        .filter(|asset| current.map_or(true, |c| c.key != asset.key))
        .collect();
    // Stable sort: equal timestamps keep listing order.
    candidates.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    let decisions = candidates
        .into_iter()
        .enumerate()
        .map(|(rank, asset)| {
            let verdict = match current {
                Some(_) => {
                    if age(asset, now) < policy.version_ttl {
                        Verdict::Keep(KeepReason::Recent)
                    } else if rank < policy.version_limit {
                        Verdict::Keep(KeepReason::WithinVersionLimit)
                    } else {
                        Verdict::Delete
                    }
                }
                None => match tombstones.removed_at(&asset.key) {
                    Some(removed_at) if now - removed_at < policy.removed_ttl => {
                        Verdict::Keep(KeepReason::AwaitingRemoval)
                    }
                    Some(_) => Verdict::Expire,
                    None => Verdict::Tombstone,
                },
            };
            CandidateDecision {
                key: asset.key.clone(),
                rank,
                verdict,
            }
        })
        .collect();

    GroupPlan {
        logical_name: group.logical_name.clone(),
        current: current.map(|c| c.key.clone()),
        decisions,
    }
}

/// Plan retention across every remote group. `current` maps logical names to the
/// locally intended physical asset.
pub fn plan_retention(
    groups: &[LogicalGroup],
    current: &HashMap<String, PhysicalAsset>,
    tombstones: &dyn TombstoneLookup,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> RetentionPlan {
    RetentionPlan {
        groups: groups
            .iter()
            .map(|group| {
                plan_group(
                    group,
                    current.get(&group.logical_name),
                    tombstones,
                    policy,
                    now,
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{group_by_logical_name, DefaultFingerprint};
    use chrono::TimeZone;

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            version_limit: 2,
            version_ttl: TimeDelta::hours(1),
            removed_ttl: TimeDelta::hours(48),
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 5, day, 15, 38, 31).unwrap()
    }

    fn remote(key: &str, ts: DateTime<Utc>) -> PhysicalAsset {
        PhysicalAsset::remote(key, ts, &DefaultFingerprint)
    }

    #[test]
    fn current_version_is_never_a_candidate() {
        let group = LogicalGroup {
            logical_name: "a.js".into(),
            assets: vec![remote("a-1.js", at(1)), remote("a-2.js", at(2))],
        };
        let current = PhysicalAsset::local("a-1.js", &DefaultFingerprint);
        let plan = plan_group(&group, Some(&current), &HashMap::new(), &policy(), at(20));
        assert_eq!(plan.decisions.len(), 1);
        assert_eq!(plan.decisions[0].key, "a-2.js");
        assert_eq!(plan.decisions[0].rank, 0);
    }

    #[test]
    fn ranks_follow_newest_first() {
        let group = LogicalGroup {
            logical_name: "a.js".into(),
            assets: vec![
                remote("a-1.js", at(1)),
                remote("a-3.js", at(3)),
                remote("a-2.js", at(2)),
            ],
        };
        let current = PhysicalAsset::local("a-9.js", &DefaultFingerprint);
        let plan = plan_group(&group, Some(&current), &HashMap::new(), &policy(), at(20));
        let order: Vec<_> = plan.decisions.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(order, vec!["a-3.js", "a-2.js", "a-1.js"]);
        assert_eq!(plan.decisions[2].verdict, Verdict::Delete);
    }

    #[test]
    fn recent_versions_survive_past_the_limit() {
        let now = at(10);
        let group = LogicalGroup {
            logical_name: "a.js".into(),
            assets: vec![
                remote("a-1.js", now - TimeDelta::minutes(4)),
                remote("a-2.js", now - TimeDelta::minutes(3)),
                remote("a-3.js", now - TimeDelta::minutes(2)),
            ],
        };
        let current = PhysicalAsset::local("a-4.js", &DefaultFingerprint);
        let plan = plan_group(&group, Some(&current), &HashMap::new(), &policy(), now);
        assert!(plan
            .decisions
            .iter()
            .all(|d| d.verdict == Verdict::Keep(KeepReason::Recent)));
    }

    #[test]
    fn age_exactly_at_ttl_is_not_recent() {
        let now = at(10);
        let group = LogicalGroup {
            logical_name: "a.js".into(),
            assets: vec![remote("a-1.js", now - TimeDelta::hours(1))],
        };
        let current = PhysicalAsset::local("a-2.js", &DefaultFingerprint);
        let strict = RetentionPolicy {
            version_limit: 0,
            ..policy()
        };
        let plan = plan_group(&group, Some(&current), &HashMap::new(), &strict, now);
        assert_eq!(plan.decisions[0].verdict, Verdict::Delete);
    }

    #[test]
    fn future_timestamps_count_as_new() {
        let now = at(10);
        let group = LogicalGroup {
            logical_name: "a.js".into(),
            assets: vec![remote("a-1.js", now + TimeDelta::hours(5))],
        };
        let current = PhysicalAsset::local("a-2.js", &DefaultFingerprint);
        let strict = RetentionPolicy {
            version_limit: 0,
            ..policy()
        };
        let plan = plan_group(&group, Some(&current), &HashMap::new(), &strict, now);
        assert_eq!(plan.decisions[0].verdict, Verdict::Keep(KeepReason::Recent));
    }

    #[test]
    fn retired_assets_walk_the_tombstone_states() {
        let now = at(20);
        let groups = group_by_logical_name(vec![
            remote("gone-1.js", at(1)),
            remote("gone-2.js", at(2)),
            remote("gone-3.js", at(3)),
        ]);
        let mut tombstones = HashMap::new();
        tombstones.insert("gone-2.js".to_string(), now - TimeDelta::hours(47));
        tombstones.insert("gone-3.js".to_string(), now - TimeDelta::hours(48));

        let plan = plan_retention(&groups, &HashMap::new(), &tombstones, &policy(), now);
        assert_eq!(plan.tombstones(), vec!["gone-1.js".to_string()]);
        assert_eq!(plan.pending(), vec!["gone-2.js".to_string()]);
        assert_eq!(plan.expired(), vec!["gone-3.js".to_string()]);
        assert_eq!(plan.deletions(), vec!["gone-3.js".to_string()]);
    }
}
