//! Group access restrictions and how they merge down the block graph.
//!
//! A block's authored `group_access` maps partition ids to the groups
//! allowed to see it. Within one partition, an absent entry, a `null`, and
//! an empty list all mean "every group". [`GroupAccess`] makes that explicit
//! instead of overloading an empty set.
//!
//! A block's effective access in a partition is its own restriction
//! intersected with the union of its parents' effective access. A block
//! reached through any unrestricted parent is unrestricted from that path.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Identifier of a user partition.
pub type PartitionId = u64;

/// Identifier of a group within a partition.
pub type GroupId = u64;

/// Which groups of one partition may access a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupAccess {
    /// Every group, and users with no group.
    Unrestricted,
    /// Only members of these groups. An empty set admits nobody.
    RestrictedTo(BTreeSet<GroupId>),
}

impl GroupAccess {
    /// Interpret an authored group list; `None` and `[]` mean unrestricted.
    pub fn from_group_ids(ids: Option<Vec<GroupId>>) -> Self {
        match ids {
            Some(ids) if !ids.is_empty() => Self::RestrictedTo(ids.into_iter().collect()),
            _ => Self::Unrestricted,
        }
    }

    /// Access granted by both. `Unrestricted` is the identity.
    pub fn intersection(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unrestricted, other) | (other, Self::Unrestricted) => other,
            (Self::RestrictedTo(a), Self::RestrictedTo(b)) => {
                Self::RestrictedTo(a.intersection(&b).copied().collect())
            }
        }
    }

    /// Access granted by either. `Unrestricted` absorbs.
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::RestrictedTo(mut a), Self::RestrictedTo(b)) => {
                a.extend(b);
                Self::RestrictedTo(a)
            }
            _ => Self::Unrestricted,
        }
    }

    /// Whether a user in `group` (or in no group) passes this restriction.
    pub fn admits(&self, group: Option<GroupId>) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::RestrictedTo(allowed) => group.is_some_and(|g| allowed.contains(&g)),
        }
    }
}

/// Effective group access of one block across all partitions.
///
/// Only restricted partitions are stored; any partition not listed is
/// unrestricted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedGroupAccess {
    restricted: BTreeMap<PartitionId, BTreeSet<GroupId>>,
}

impl MergedGroupAccess {
    /// Merge a block's own restrictions with its parents' merged access.
    ///
    /// Only partitions in `partitions` are considered. A block with no
    /// parents (the root) inherits nothing.
    pub fn new<'a, I>(
        partitions: I,
        own: &HashMap<PartitionId, GroupAccess>,
        parents: &[&MergedGroupAccess],
    ) -> Self
    where
        I: IntoIterator<Item = &'a PartitionId>,
    {
        let mut restricted = BTreeMap::new();
        for &partition in partitions {
            let inherited = parents
                .iter()
                .map(|parent| parent.access(partition))
                .reduce(GroupAccess::union)
                .unwrap_or(GroupAccess::Unrestricted);
            let own_access = own
                .get(&partition)
                .cloned()
                .unwrap_or(GroupAccess::Unrestricted);

            if let GroupAccess::RestrictedTo(groups) = own_access.intersection(inherited) {
                restricted.insert(partition, groups);
            }
        }
        Self { restricted }
    }

    /// Effective access in one partition.
    pub fn access(&self, partition: PartitionId) -> GroupAccess {
        self.restricted
            .get(&partition)
            .map_or(GroupAccess::Unrestricted, |groups| {
                GroupAccess::RestrictedTo(groups.clone())
            })
    }

    /// Returns `true` if no partition restricts this block.
    pub fn is_unrestricted(&self) -> bool {
        self.restricted.is_empty()
    }

    /// Whether a user with the given partition → group assignments may
    /// access the block. A user without a group in a restricted partition is
    /// denied.
    pub fn check_group_access(&self, user_groups: &HashMap<PartitionId, GroupId>) -> bool {
        self.restricted
            .keys()
            .all(|&partition| self.access(partition).admits(user_groups.get(&partition).copied()))
    }
}

// ============================================================================
// Tests
// ============================================================================
