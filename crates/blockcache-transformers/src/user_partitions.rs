//! User partition transformer.
//!
//! Courses divide learners into groups along one or more user partitions
//! (cohorts, experiments). Blocks may restrict access to some groups of a
//! partition through their `group_access` attribute.
//!
//! Collect reads the course's partition list from the root block and walks
//! the structure in topological order, merging each block's own
//! restrictions with its parents' (see [`MergedGroupAccess`]). Apply looks
//! up the user's group in each partition and removes the blocks they cannot
//! access.

use std::collections::{HashMap, HashSet};

use blockcache_core::{BlockKey, Error, Result, UserInfo};
use blockcache_graph::{BlockStructure, BlockTransformer, CollectionContext};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::{GroupAccess, GroupId, MergedGroupAccess, PartitionId};

/// Raw block attribute holding a block's own restrictions.
pub const GROUP_ACCESS_FIELD: &str = "group_access";

/// Raw root block attribute holding the course's partitions.
pub const USER_PARTITIONS_FIELD: &str = "user_partitions";

/// Structure-wide key for the collected partition list.
pub const USER_PARTITIONS_KEY: &str = "user_partitions";

/// Per-block key for the collected [`MergedGroupAccess`].
pub const MERGED_GROUP_ACCESS_KEY: &str = "merged_group_access";

/// A group within a user partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id, unique within its partition.
    pub id: GroupId,
    /// Display name.
    pub name: String,
}

/// A way of dividing a course's users into groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPartition {
    /// Partition id, unique within the course.
    pub id: PartitionId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Assignment scheme, e.g. `cohort` or `random`.
    #[serde(default)]
    pub scheme: String,
    /// The partition's groups.
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl UserPartition {
    /// The group with id `id`, if it belongs to this partition.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }
}

/// Group assignment lookup for a user.
pub trait PartitionMembership: UserInfo {
    /// The group the user belongs to in `partition`, if any.
    fn group_for_partition(&self, partition: &UserPartition) -> Option<GroupId>;
}

/// Removes blocks whose group access excludes the user.
///
/// Staff users are never filtered. With no partitions configured on the
/// course, apply does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserPartitionTransformer;

impl UserPartitionTransformer {
    /// Transformer name and data namespace.
    pub const NAME: &'static str = "user_partitions";

    /// Version of the collected data format.
    pub const VERSION: u32 = 1;

    /// Create the transformer.
    pub fn new() -> Self {
        Self
    }

    fn read_partitions<K: BlockKey>(ctx: &CollectionContext<K>) -> Result<Vec<UserPartition>> {
        let root = ctx.root();
        match ctx.raw_field(root, USER_PARTITIONS_FIELD) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|err| {
                Error::transformer(
                    Self::NAME,
                    format!("invalid {USER_PARTITIONS_FIELD} on {root}: {err}"),
                )
            }),
        }
    }

    fn read_group_access<K: BlockKey>(
        ctx: &CollectionContext<K>,
        key: &K,
    ) -> Result<HashMap<PartitionId, GroupAccess>> {
        let authored: HashMap<PartitionId, Option<Vec<GroupId>>> =
            match ctx.raw_field(key, GROUP_ACCESS_FIELD) {
                None | Some(Value::Null) => return Ok(HashMap::new()),
                Some(value) => serde_json::from_value(value).map_err(|err| {
                    Error::transformer(
                        Self::NAME,
                        format!("invalid {GROUP_ACCESS_FIELD} on {key}: {err}"),
                    )
                })?,
            };

        Ok(authored
            .into_iter()
            .map(|(partition, ids)| (partition, GroupAccess::from_group_ids(ids)))
            .collect())
    }

    /// Blocks that deny the user on their own account: the root, or blocks
    /// with at least one parent the user can access. Blocks denied only
    /// because every parent is denied are left to orphan removal.
    fn directly_denied<K: BlockKey>(
        structure: &BlockStructure<K>,
        denied: &HashSet<K>,
    ) -> HashSet<K> {
        denied
            .iter()
            .filter(|key| {
                *key == structure.root()
                    || structure
                        .get_parents(key)
                        .iter()
                        .any(|parent| !denied.contains(parent))
            })
            .cloned()
            .collect()
    }
}

impl<K, U> BlockTransformer<K, U> for UserPartitionTransformer
where
    K: BlockKey,
    U: PartitionMembership + ?Sized,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn collect(&self, ctx: &mut CollectionContext<K>) -> Result<()> {
        ctx.request_fields([GROUP_ACCESS_FIELD]);

        let partitions = Self::read_partitions(ctx)?;
        ctx.set_transformer_data(Self::NAME, USER_PARTITIONS_KEY, &partitions)?;
        if partitions.is_empty() {
            return Ok(());
        }

        let partition_ids: Vec<PartitionId> = partitions.iter().map(|p| p.id).collect();
        let order: Vec<K> = ctx.topological_traversal().collect();
        let mut merged: HashMap<K, MergedGroupAccess> = HashMap::with_capacity(order.len());

        for key in order {
            let own = Self::read_group_access(ctx, &key)?;
            let parents: Vec<&MergedGroupAccess> = ctx
                .get_parents(&key)
                .iter()
                .filter_map(|parent| merged.get(parent))
                .collect();
            let access = MergedGroupAccess::new(&partition_ids, &own, &parents);

            ctx.set_transformer_block_data(&key, Self::NAME, MERGED_GROUP_ACCESS_KEY, &access)?;
            merged.insert(key, access);
        }

        debug!(
            "Merged group access for {} block(s) across {} partition(s)",
            merged.len(),
            partitions.len()
        );
        Ok(())
    }

    fn apply(
        &self,
        user: &U,
        structure: &mut BlockStructure<K>,
        remove_orphans: bool,
    ) -> Result<()> {
        let partitions: Vec<UserPartition> = structure
            .get_transformer_data_as(Self::NAME, USER_PARTITIONS_KEY)?
            .unwrap_or_default();
        if partitions.is_empty() {
            return Ok(());
        }
        if user.has_staff_access() {
            debug!("Skipping group access checks for staff user {}", user.username());
            return Ok(());
        }

        let user_groups: HashMap<PartitionId, GroupId> = partitions
            .iter()
            .filter_map(|partition| {
                user.group_for_partition(partition)
                    .map(|group| (partition.id, group))
            })
            .collect();

        let mut denied = HashSet::new();
        for key in structure.topological_traversal() {
            let access: MergedGroupAccess = structure
                .get_transformer_block_data_as(&key, Self::NAME, MERGED_GROUP_ACCESS_KEY)?
                .ok_or_else(|| {
                    Error::invalid_data(format!("no merged group access collected for {key}"))
                })?;
            if !access.check_group_access(&user_groups) {
                denied.insert(key);
            }
        }
        if denied.is_empty() {
            return Ok(());
        }

        let seeds = Self::directly_denied(structure, &denied);
        let removed =
            structure.remove_block_if_with_orphans(|key| seeds.contains(key), remove_orphans);
        debug!(
            "Removed {} block(s) inaccessible to {}",
            removed.len(),
            user.username()
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
