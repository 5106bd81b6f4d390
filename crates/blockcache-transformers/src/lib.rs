//! Block transformers for blockcache.
//!
//! # Modules
//!
//! - [`access`]: Per-partition group access and multi-parent merging
//! - [`user_partitions`]: The user partition transformer

pub mod access;
pub mod user_partitions;

pub use access::{GroupAccess, GroupId, MergedGroupAccess, PartitionId};
pub use user_partitions::{Group, PartitionMembership, UserPartition, UserPartitionTransformer};
