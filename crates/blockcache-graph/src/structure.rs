//! Block graph with collected data.
//!
//! [`BlockStructure`] adds two kinds of data to a [`BlockGraph`]:
//!
//! - Per-block [`BlockData`]: raw fields captured from the content store,
//!   plus data each transformer recorded for the block.
//! - Structure-wide transformer data, e.g. a course's partition list or a
//!   transformer's version stamp.
//!
//! Transformer data is namespaced by transformer name and stored as
//! `serde_json::Value`, so a structure can be written to a cache and read
//! back without knowing the transformers' own types. The `*_as` readers
//! deserialize into a caller-chosen type.
//!
//! Writes happen during the collect phase, through
//! [`CollectionContext`](crate::CollectionContext). During the apply phase
//! a structure is only read and pruned.

use std::collections::HashMap;
use std::ops::Deref;

use blockcache_core::{BlockKey, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{BlockGraph, BlockRelations};

/// Reserved structure-wide key holding a transformer's version stamp.
pub const TRANSFORMER_VERSION_KEY: &str = "_version";

/// Transformer name → (key → value).
pub type TransformerData = HashMap<String, HashMap<String, Value>>;

/// Data collected for one block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    fields: HashMap<String, Value>,
    transformer_data: TransformerData,
}

impl BlockData {
    /// A captured raw field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// A value a transformer recorded for this block.
    pub fn transformer_value(&self, transformer: &str, key: &str) -> Option<&Value> {
        self.transformer_data.get(transformer)?.get(key)
    }

    /// Returns `true` if nothing was collected for this block.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.transformer_data.is_empty()
    }

    pub(crate) fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub(crate) fn set_transformer_value(&mut self, transformer: &str, key: &str, value: Value) {
        self.transformer_data
            .entry(transformer.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

/// A block graph together with its collected data.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockStructure<K: BlockKey> {
    graph: BlockGraph<K>,
    block_data: HashMap<K, BlockData>,
    transformer_data: TransformerData,
}

impl<K: BlockKey> Deref for BlockStructure<K> {
    type Target = BlockGraph<K>;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

impl<K: BlockKey> BlockStructure<K> {
    /// Create a structure holding only the root block.
    pub fn new(root: K) -> Self {
        Self {
            graph: BlockGraph::new(root),
            block_data: HashMap::new(),
            transformer_data: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(
        graph: BlockGraph<K>,
        block_data: HashMap<K, BlockData>,
        transformer_data: TransformerData,
    ) -> Self {
        Self {
            graph,
            block_data,
            transformer_data,
        }
    }

    /// The underlying graph.
    pub fn graph(&self) -> &BlockGraph<K> {
        &self.graph
    }

    /// Register a parent → child edge.
    pub fn add_relation(&mut self, parent: &K, child: &K) {
        self.graph.add_relation(parent, child);
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Collected data for a block, if any.
    pub fn block_data(&self, key: &K) -> Option<&BlockData> {
        self.block_data.get(key)
    }

    /// A raw field captured for `key`.
    pub fn get_block_field(&self, key: &K, field: &str) -> Option<&Value> {
        self.block_data.get(key)?.field(field)
    }

    /// Structure-wide data recorded by `transformer`.
    pub fn get_transformer_data(&self, transformer: &str, key: &str) -> Option<&Value> {
        self.transformer_data.get(transformer)?.get(key)
    }

    /// Structure-wide transformer data, deserialized as `T`.
    pub fn get_transformer_data_as<T: DeserializeOwned>(
        &self,
        transformer: &str,
        key: &str,
    ) -> Result<Option<T>> {
        self.get_transformer_data(transformer, key)
            .map(|value| T::deserialize(value).map_err(Into::into))
            .transpose()
    }

    /// The version `transformer` was collected with, or 0 if it never was.
    pub fn get_transformer_data_version(&self, transformer: &str) -> u32 {
        self.get_transformer_data(transformer, TRANSFORMER_VERSION_KEY)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    }

    /// Data `transformer` recorded for block `key`.
    pub fn get_transformer_block_data(
        &self,
        key: &K,
        transformer: &str,
        field: &str,
    ) -> Option<&Value> {
        self.block_data.get(key)?.transformer_value(transformer, field)
    }

    /// Per-block transformer data, deserialized as `T`.
    pub fn get_transformer_block_data_as<T: DeserializeOwned>(
        &self,
        key: &K,
        transformer: &str,
        field: &str,
    ) -> Result<Option<T>> {
        self.get_transformer_block_data(key, transformer, field)
            .map(|value| T::deserialize(value).map_err(Into::into))
            .transpose()
    }

    // ------------------------------------------------------------------------
    // Collect-phase writes
    // ------------------------------------------------------------------------

    pub(crate) fn set_block_field(&mut self, key: &K, field: &str, value: Value) {
        self.block_data
            .entry(key.clone())
            .or_default()
            .set_field(field, value);
    }

    pub(crate) fn set_transformer_data(&mut self, transformer: &str, key: &str, value: Value) {
        self.transformer_data
            .entry(transformer.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub(crate) fn set_transformer_block_data(
        &mut self,
        block: &K,
        transformer: &str,
        key: &str,
        value: Value,
    ) {
        self.block_data
            .entry(block.clone())
            .or_default()
            .set_transformer_value(transformer, key, value);
    }

    pub(crate) fn set_transformer_version(&mut self, transformer: &str, version: u32) {
        self.set_transformer_data(transformer, TRANSFORMER_VERSION_KEY, Value::from(version));
    }

    pub(crate) fn insert_block_data(&mut self, key: K, data: BlockData) {
        self.block_data.insert(key, data);
    }

    pub(crate) fn all_transformer_data(&self) -> &TransformerData {
        &self.transformer_data
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Remove a block, its edges, and its data.
    ///
    /// Returns `false` if `key` was not a block.
    pub fn remove_block(&mut self, key: &K) -> bool {
        self.detach(key).is_some()
    }

    /// Remove every block reachable from the root for which `predicate`
    /// holds. Children left without parents are kept.
    ///
    /// Returns the removed blocks in removal order.
    pub fn remove_block_if<F>(&mut self, predicate: F) -> Vec<K>
    where
        F: FnMut(&K) -> bool,
    {
        self.remove_block_if_with_orphans(predicate, false)
    }

    /// Like [`remove_block_if`](Self::remove_block_if). With `remove_orphans`,
    /// every non-root block whose last parent is removed is removed as well,
    /// recursively.
    ///
    /// The predicate is evaluated over a topological snapshot taken before
    /// any removal; blocks already removed by cascading are skipped.
    pub fn remove_block_if_with_orphans<F>(
        &mut self,
        mut predicate: F,
        remove_orphans: bool,
    ) -> Vec<K>
    where
        F: FnMut(&K) -> bool,
    {
        let snapshot: Vec<K> = self.topological_traversal().collect();
        let mut removed = Vec::new();

        for key in snapshot {
            if !self.has_block(&key) || !predicate(&key) {
                continue;
            }

            let mut worklist = vec![key];
            while let Some(current) = worklist.pop() {
                let Some(relations) = self.detach(&current) else {
                    continue;
                };
                removed.push(current);

                if remove_orphans {
                    worklist.extend(relations.children.into_iter().filter(|child| {
                        child != self.graph.root()
                            && self.has_block(child)
                            && self.get_parents(child).is_empty()
                    }));
                }
            }
        }

        debug!(
            "Removed {} block(s) from structure rooted at {}",
            removed.len(),
            self.graph.root()
        );
        removed
    }

    fn detach(&mut self, key: &K) -> Option<BlockRelations<K>> {
        let relations = self.graph.remove_relations(key)?;
        self.block_data.remove(key);
        Some(relations)
    }
}

// ============================================================================
// Tests
// ============================================================================
