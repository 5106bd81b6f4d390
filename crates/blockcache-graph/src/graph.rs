//! The block graph: a rooted DAG of block identities.
//!
//! Edges are stored in both directions. Every child listed under a parent
//! lists that parent among its own parents, and lookups for identities that
//! were never added return an empty slice instead of failing.

use std::collections::HashMap;
use std::convert::Infallible;

use blockcache_core::BlockKey;
use serde::{Deserialize, Serialize};

use crate::traversal::traverse_topologically;

/// Parent and child lists of a single block, in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRelations<K> {
    /// Blocks this block is a child of.
    pub parents: Vec<K>,
    /// Blocks under this block.
    pub children: Vec<K>,
}

impl<K> Default for BlockRelations<K> {
    fn default() -> Self {
        Self {
            parents: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// A rooted DAG of blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockGraph<K: BlockKey> {
    root: K,
    relations: HashMap<K, BlockRelations<K>>,
}

impl<K: BlockKey> BlockGraph<K> {
    /// Create a graph holding only the root block.
    pub fn new(root: K) -> Self {
        let mut relations = HashMap::new();
        relations.insert(root.clone(), BlockRelations::default());
        Self { root, relations }
    }

    /// Rebuild a graph from a relation map, e.g. one read from the cache.
    pub(crate) fn from_relations(root: K, relations: HashMap<K, BlockRelations<K>>) -> Self {
        Self { root, relations }
    }

    /// The root block.
    pub fn root(&self) -> &K {
        &self.root
    }

    /// Register a parent → child edge.
    ///
    /// Both blocks are added if they are new. Calling this twice for the same
    /// pair records the edge twice.
    pub fn add_relation(&mut self, parent: &K, child: &K) {
        self.relations
            .entry(child.clone())
            .or_default()
            .parents
            .push(parent.clone());
        self.relations
            .entry(parent.clone())
            .or_default()
            .children
            .push(child.clone());
    }

    /// Parents of `key`; empty if the block is unknown.
    pub fn get_parents(&self, key: &K) -> &[K] {
        self.relations
            .get(key)
            .map(|r| r.parents.as_slice())
            .unwrap_or(&[])
    }

    /// Children of `key`; empty if the block is unknown.
    pub fn get_children(&self, key: &K) -> &[K] {
        self.relations
            .get(key)
            .map(|r| r.children.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `key` is a block of this graph.
    pub fn has_block(&self, key: &K) -> bool {
        self.relations.contains_key(key)
    }

    /// Number of blocks, including any left unreachable by removals.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Returns `true` if the graph has no blocks (only after removing the root).
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// All block identities, in no particular order.
    pub fn block_keys(&self) -> impl Iterator<Item = &K> {
        self.relations.keys()
    }

    /// Blocks from the root in topological order.
    pub fn topological_traversal(&self) -> impl Iterator<Item = K> {
        self.filtered_traversal(|_| true)
    }

    /// Blocks from the root in topological order, skipping those rejected
    /// by `predicate`. Rejected blocks still release their children.
    pub fn filtered_traversal<F>(&self, mut predicate: F) -> impl Iterator<Item = K>
    where
        F: FnMut(&K) -> bool,
    {
        self.try_topological_traversal(
            move |key| Ok::<bool, Infallible>(predicate(key)),
            |key| Ok(key.clone()),
        )
        .map(|item| match item {
            Ok(key) => key,
            Err(never) => match never {},
        })
    }

    /// Topological traversal with fallible predicate and result functions.
    ///
    /// The first error is yielded and ends the traversal. Yields nothing once
    /// the root itself has been removed.
    pub fn try_topological_traversal<T, E, F, R>(
        &self,
        predicate: F,
        get_result: R,
    ) -> impl Iterator<Item = Result<T, E>>
    where
        F: FnMut(&K) -> Result<bool, E>,
        R: FnMut(&K) -> Result<T, E>,
    {
        let limit = if self.has_block(&self.root) {
            usize::MAX
        } else {
            0
        };
        traverse_topologically(
            self.root.clone(),
            |key: &K| self.get_parents(key).to_vec(),
            |key: &K| self.get_children(key).to_vec(),
            predicate,
            get_result,
        )
        .take(limit)
    }

    /// Detach `key` from all neighbours and drop its entry.
    ///
    /// Returns the removed relations, or `None` if `key` was not a block.
    pub(crate) fn remove_relations(&mut self, key: &K) -> Option<BlockRelations<K>> {
        let relations = self.relations.remove(key)?;
        for child in &relations.children {
            if let Some(child_relations) = self.relations.get_mut(child) {
                child_relations.parents.retain(|p| p != key);
            }
        }
        for parent in &relations.parents {
            if let Some(parent_relations) = self.relations.get_mut(parent) {
                parent_relations.children.retain(|c| c != key);
            }
        }
        Some(relations)
    }

    /// The raw relation map.
    pub(crate) fn relations(&self) -> &HashMap<K, BlockRelations<K>> {
        &self.relations
    }
}

// ============================================================================
// Tests
// ============================================================================
