//! Building structures and moving them in and out of the cache.
//!
//! A collected structure is stored as:
//!
//! - one root entry, keyed by `root_key_prefix + root.cache_key()`, holding
//!   the relation map and the structure-wide transformer data;
//! - one entry per block, keyed by `block_key_prefix + block.cache_key()`,
//!   holding that block's [`BlockData`] and the root it was collected under.
//!
//! Block entries are written first and the root entry last, so a reader
//! that finds the root entry finds a complete snapshot. Structures with
//! different roots may share blocks and so overwrite each other's block
//! entries; a block entry stamped with another root is a miss. Undecodable
//! entries, stale version stamps and missing block entries are misses too.
//!
//! Values are JSON encoded with `serde_json`. Decoding always builds a fresh
//! structure; nothing is shared with the structure that was written.

use std::collections::{HashMap, HashSet};

use blockcache_core::{BlockKey, CacheStore, ContentBlock, ContentStore, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::collection::CollectionContext;
use crate::graph::{BlockGraph, BlockRelations};
use crate::structure::{BlockData, BlockStructure, TransformerData};
use crate::transformer::TransformerRegistry;

/// Default prefix of root entry keys.
pub const DEFAULT_ROOT_KEY_PREFIX: &str = "root.key.";

// ============================================================================
// Cache entries
// ============================================================================

/// Root entry as written. Borrows from the live structure.
#[derive(Serialize)]
struct RootEntryRef<'a, K> {
    root: &'a K,
    relations: Vec<(&'a K, &'a BlockRelations<K>)>,
    transformer_data: &'a TransformerData,
}

/// Root entry as read back.
#[derive(Deserialize)]
struct RootEntry<K> {
    root: K,
    relations: Vec<(K, BlockRelations<K>)>,
    transformer_data: TransformerData,
}

/// Block entry as written.
#[derive(Serialize)]
struct BlockEntryRef<'a, K> {
    root: &'a K,
    data: &'a BlockData,
}

/// Block entry as read back.
#[derive(Deserialize)]
struct BlockEntry<K> {
    root: K,
    data: BlockData,
}

// ============================================================================
// Factory
// ============================================================================

/// Creates block structures from a content store or a cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockStructureFactory {
    root_key_prefix: String,
    block_key_prefix: String,
}

impl Default for BlockStructureFactory {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_KEY_PREFIX, "")
    }
}

impl BlockStructureFactory {
    /// Create a factory with custom cache key prefixes.
    pub fn new(root_key_prefix: impl Into<String>, block_key_prefix: impl Into<String>) -> Self {
        Self {
            root_key_prefix: root_key_prefix.into(),
            block_key_prefix: block_key_prefix.into(),
        }
    }

    /// Cache key of the root entry for `root`.
    pub fn root_cache_key<K: BlockKey>(&self, root: &K) -> String {
        format!("{}{}", self.root_key_prefix, root.cache_key())
    }

    /// Cache key of the data entry for `block`.
    pub fn block_cache_key<K: BlockKey>(&self, block: &K) -> String {
        format!("{}{}", self.block_key_prefix, block.cache_key())
    }

    // ------------------------------------------------------------------------
    // Content store
    // ------------------------------------------------------------------------

    /// Walk the content store from `root` and build a collection context.
    ///
    /// Every edge is recorded, but each distinct block is fetched and
    /// expanded only once, even when several parents share it.
    pub fn create_from_store<K, S>(&self, root: &K, store: &S) -> Result<CollectionContext<K>>
    where
        K: BlockKey,
        S: ContentStore<K>,
    {
        let root_block = store.get_root_block(root)?;
        let mut ctx = CollectionContext::new(root_block.key());
        let mut visited: HashSet<K> = HashSet::from([root_block.key()]);
        let mut pending = vec![root_block];

        while let Some(block) = pending.pop() {
            let key = block.key();
            let children = store.get_children(&block)?;
            ctx.add_block(block);

            let mut unvisited = Vec::new();
            for child in children {
                let child_key = child.key();
                ctx.add_relation(&key, &child_key);
                if visited.insert(child_key) {
                    unvisited.push(child);
                }
            }
            // Reversed so blocks are expanded in authored order.
            pending.extend(unvisited.into_iter().rev());
        }

        debug!(
            "Built structure rooted at {} with {} block(s) from the content store",
            ctx.root(),
            ctx.len()
        );
        Ok(ctx)
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    /// Write `structure` to the cache, block entries first and root last.
    pub fn serialize_to_cache<K, C>(&self, structure: &BlockStructure<K>, cache: &C) -> Result<()>
    where
        K: BlockKey,
        C: CacheStore + ?Sized,
    {
        let root = structure.root();
        let empty = BlockData::default();
        let mut entries = HashMap::with_capacity(structure.len());
        for key in structure.block_keys() {
            let entry = BlockEntryRef {
                root,
                data: structure.block_data(key).unwrap_or(&empty),
            };
            entries.insert(self.block_cache_key(key), serde_json::to_vec(&entry)?);
        }
        cache.set_many(entries)?;

        let entry = RootEntryRef {
            root,
            relations: structure.relations().iter().collect(),
            transformer_data: structure.all_transformer_data(),
        };
        cache.set(&self.root_cache_key(root), serde_json::to_vec(&entry)?)?;

        debug!(
            "Cached structure rooted at {} ({} block(s))",
            root,
            structure.len()
        );
        Ok(())
    }

    /// Load the structure for `root` from the cache.
    ///
    /// Returns `Ok(None)` on a miss, including when the cached data was
    /// collected by a different version of any registered transformer.
    pub fn create_from_cache<K, C, U>(
        &self,
        root: &K,
        cache: &C,
        registry: &TransformerRegistry<K, U>,
    ) -> Result<Option<BlockStructure<K>>>
    where
        K: BlockKey,
        C: CacheStore + ?Sized,
        U: ?Sized,
    {
        let root_key = self.root_cache_key(root);
        let Some(bytes) = cache.get(&root_key)? else {
            debug!("No cached structure for {}", root);
            return Ok(None);
        };

        let entry: RootEntry<K> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Ignoring undecodable cache entry '{}': {}", root_key, err);
                return Ok(None);
            }
        };
        if entry.root != *root {
            warn!(
                "Cache entry '{}' holds a structure rooted at {}",
                root_key, entry.root
            );
            return Ok(None);
        }

        let graph = BlockGraph::from_relations(entry.root, entry.relations.into_iter().collect());
        let mut structure =
            BlockStructure::from_parts(graph, HashMap::new(), entry.transformer_data);

        for transformer in registry.iter() {
            let cached = structure.get_transformer_data_version(transformer.name());
            if cached != transformer.version() {
                info!(
                    "Cached structure for {} is stale: '{}' collected at v{}, current v{}",
                    root,
                    transformer.name(),
                    cached,
                    transformer.version()
                );
                return Ok(None);
            }
        }

        let blocks: Vec<K> = structure.block_keys().cloned().collect();
        let keys: Vec<String> = blocks.iter().map(|b| self.block_cache_key(b)).collect();
        let mut found = cache.get_many(&keys)?;

        for (block, key) in blocks.into_iter().zip(&keys) {
            let Some(bytes) = found.remove(key) else {
                warn!("Cache entry '{}' is missing; treating {} as a miss", key, root);
                return Ok(None);
            };
            let entry: BlockEntry<K> = match serde_json::from_slice(&bytes) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Ignoring undecodable cache entry '{}': {}", key, err);
                    return Ok(None);
                }
            };
            if entry.root != *root {
                info!(
                    "Cache entry '{}' was written for {}; treating {} as a miss",
                    key, entry.root, root
                );
                return Ok(None);
            }
            if !entry.data.is_empty() {
                structure.insert_block_data(block, entry.data);
            }
        }

        debug!(
            "Loaded cached structure rooted at {} ({} block(s))",
            root,
            structure.len()
        );
        Ok(Some(structure))
    }

    /// Invalidate the cached structure for `root`.
    ///
    /// Only the root entry is deleted. Block entries are unreachable without
    /// it and are left to the cache's eviction policy.
    pub fn remove_from_cache<K, C>(&self, root: &K, cache: &C) -> Result<()>
    where
        K: BlockKey,
        C: CacheStore + ?Sized,
    {
        cache.delete(&self.root_cache_key(root))?;
        info!("Invalidated cached structure for {}", root);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
