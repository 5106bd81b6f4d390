//! Blockcache: cached, per-user filtered views of course block graphs.
//!
//! Building a course's block graph from the content store is expensive,
//! while what each user may see changes per request. Blockcache splits the
//! work in two:
//!
//! - **collect**: a user-independent pass, run once per snapshot, whose
//!   result is cached;
//! - **apply**: a cheap per-request pass that filters the cached structure
//!   for one user.
//!
//! This crate re-exports the component crates and adds configuration and
//! the [`BlockCache`] entry point.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use blockcache::{BlockCache, MemoryCache, TransformerRegistry, UserPartitionTransformer};
//!
//! let registry = TransformerRegistry::new().with(UserPartitionTransformer::new())?;
//! let blocks = BlockCache::new(Arc::new(MemoryCache::new()), registry);
//! let visible = blocks.get_blocks(&store, &user, &course_root, None)?;
//! ```

pub mod api;
pub mod config;

pub use api::BlockCache;
pub use config::{BlockCacheConfig, CacheConfig, TransformConfig};

pub use blockcache_core::{
    BlockKey, CacheStore, ContentBlock, ContentStore, Error, MemoryCache, Result, UsageKey,
    UserInfo,
};
pub use blockcache_graph::{
    BlockData, BlockGraph, BlockStructure, BlockStructureFactory, BlockTransformer,
    CollectionContext, TransformerRegistry,
};
pub use blockcache_transformers::{
    GroupAccess, MergedGroupAccess, PartitionMembership, UserPartition, UserPartitionTransformer,
};

