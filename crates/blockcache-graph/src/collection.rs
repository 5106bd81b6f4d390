//! Collect-phase view of a block structure.
//!
//! A [`CollectionContext`] wraps a [`BlockStructure`] while it is being built
//! from the content store. On top of the structure it keeps:
//!
//! - the raw blocks read from the content store, so transformers can read
//!   any attribute while collecting;
//! - the set of raw field names transformers asked to have captured into
//!   each block's [`BlockData`](crate::BlockData).
//!
//! Raw blocks are dropped by [`into_structure`](CollectionContext::into_structure);
//! they are never part of what gets cached.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};

use blockcache_core::{BlockKey, ContentBlock, Result};
use serde::Serialize;
use serde_json::Value;

use crate::structure::BlockStructure;

/// A block structure under construction, with access to raw blocks.
pub struct CollectionContext<K: BlockKey> {
    structure: BlockStructure<K>,
    raw_blocks: HashMap<K, Box<dyn ContentBlock<K>>>,
    requested_fields: BTreeSet<String>,
}

impl<K: BlockKey> CollectionContext<K> {
    /// Create a context holding only the root block.
    pub fn new(root: K) -> Self {
        Self {
            structure: BlockStructure::new(root),
            raw_blocks: HashMap::new(),
            requested_fields: BTreeSet::new(),
        }
    }

    /// Track a raw block for field capture.
    pub fn add_block<B>(&mut self, block: B)
    where
        B: ContentBlock<K> + 'static,
    {
        self.raw_blocks.insert(block.key(), Box::new(block));
    }

    /// The raw block for `key`, if it was added.
    pub fn raw_block(&self, key: &K) -> Option<&dyn ContentBlock<K>> {
        self.raw_blocks.get(key).map(|block| &**block)
    }

    /// Read an attribute straight from the raw block.
    pub fn raw_field(&self, key: &K, field: &str) -> Option<Value> {
        self.raw_blocks.get(key)?.field(field)
    }

    /// Number of tracked raw blocks.
    pub fn raw_block_count(&self) -> usize {
        self.raw_blocks.len()
    }

    /// Ask for raw fields to be captured into every block's data.
    pub fn request_fields<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_fields
            .extend(names.into_iter().map(Into::into));
    }

    /// Field names requested so far.
    pub fn requested_fields(&self) -> impl Iterator<Item = &str> {
        self.requested_fields.iter().map(String::as_str)
    }

    /// Copy every requested field from each raw block into its block data.
    ///
    /// Fields a raw block does not have are skipped.
    pub fn collect_requested_fields(&mut self) {
        if self.requested_fields.is_empty() {
            return;
        }

        for (key, block) in &self.raw_blocks {
            for field in &self.requested_fields {
                if let Some(value) = block.field(field) {
                    self.structure.set_block_field(key, field, value);
                }
            }
        }
    }

    /// Record structure-wide data for `transformer`.
    pub fn set_transformer_data<V: Serialize>(
        &mut self,
        transformer: &str,
        key: &str,
        value: &V,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.structure.set_transformer_data(transformer, key, value);
        Ok(())
    }

    /// Record data `transformer` computed for `block`.
    pub fn set_transformer_block_data<V: Serialize>(
        &mut self,
        block: &K,
        transformer: &str,
        key: &str,
        value: &V,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.structure
            .set_transformer_block_data(block, transformer, key, value);
        Ok(())
    }

    pub(crate) fn stamp_version(&mut self, transformer: &str, version: u32) {
        self.structure.set_transformer_version(transformer, version);
    }

    /// Finish collection, dropping the raw blocks.
    pub fn into_structure(self) -> BlockStructure<K> {
        self.structure
    }
}

impl<K: BlockKey> Deref for CollectionContext<K> {
    type Target = BlockStructure<K>;

    fn deref(&self) -> &Self::Target {
        &self.structure
    }
}

impl<K: BlockKey> DerefMut for CollectionContext<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.structure
    }
}

impl<K: BlockKey> fmt::Debug for CollectionContext<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionContext")
            .field("structure", &self.structure)
            .field("raw_blocks", &self.raw_blocks.len())
            .field("requested_fields", &self.requested_fields)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use blockcache_core::UsageKey;
    use blockcache_core::mock::MockBlock;

    fn context() -> CollectionContext<UsageKey> {
        let mut ctx = CollectionContext::new(UsageKey::from("course"));
        ctx.add_block(
            MockBlock::new("course")
                .with_field("display_name", "Demo Course")
                .with_field("user_partitions", serde_json::json!([])),
        );
        ctx.add_block(
            MockBlock::new("unit")
                .with_field("display_name", "Unit 1")
                .with_field("graded", true),
        );
        ctx.add_relation(&UsageKey::from("course"), &UsageKey::from("unit"));
        ctx
    }

    #[test]
    fn test_collect_without_requests_is_noop() {
        let mut ctx = context();
        ctx.collect_requested_fields();

        assert!(ctx.block_data(&UsageKey::from("course")).is_none());
        assert!(ctx.block_data(&UsageKey::from("unit")).is_none());
    }

    #[test]
    fn test_collect_requested_fields() {
        let mut ctx = context();
        ctx.request_fields(["display_name"]);
        ctx.request_fields(vec!["graded".to_string()]);
        ctx.collect_requested_fields();

        let unit = UsageKey::from("unit");
        assert_eq!(
            ctx.get_block_field(&unit, "display_name"),
            Some(&Value::from("Unit 1"))
        );
        assert_eq!(ctx.get_block_field(&unit, "graded"), Some(&Value::from(true)));

        // The course has no "graded" attribute, so nothing is captured for it.
        let course = UsageKey::from("course");
        assert!(ctx.get_block_field(&course, "graded").is_none());
        assert!(ctx.get_block_field(&course, "user_partitions").is_none());
    }

    #[test]
    fn test_requested_fields_are_deduplicated() {
        let mut ctx = context();
        ctx.request_fields(["graded", "display_name", "graded"]);
        assert_eq!(
            ctx.requested_fields().collect::<Vec<_>>(),
            vec!["display_name", "graded"]
        );
    }

    #[test]
    fn test_raw_field_access() {
        let ctx = context();
        assert_eq!(
            ctx.raw_field(&UsageKey::from("course"), "display_name"),
            Some(Value::from("Demo Course"))
        );
        assert!(ctx.raw_field(&UsageKey::from("ghost"), "display_name").is_none());
        assert!(ctx.raw_block(&UsageKey::from("unit")).is_some());
        assert_eq!(ctx.raw_block_count(), 2);
    }

    #[test]
    fn test_transformer_setters_serialize_values() {
        let mut ctx = context();
        let unit = UsageKey::from("unit");
        ctx.set_transformer_data("grades", "policy", &vec!["hw", "exam"])
            .unwrap();
        ctx.set_transformer_block_data(&unit, "grades", "weight", &0.25)
            .unwrap();

        let policy: Option<Vec<String>> = ctx.get_transformer_data_as("grades", "policy").unwrap();
        assert_eq!(policy, Some(vec!["hw".to_string(), "exam".to_string()]));
        assert_eq!(
            ctx.get_transformer_block_data(&unit, "grades", "weight"),
            Some(&Value::from(0.25))
        );
    }

    #[test]
    fn test_into_structure_drops_raw_blocks() {
        let mut ctx = context();
        ctx.request_fields(["display_name"]);
        ctx.collect_requested_fields();

        let structure = ctx.into_structure();
        assert_eq!(
            structure.get_block_field(&UsageKey::from("course"), "display_name"),
            Some(&Value::from("Demo Course"))
        );
        assert!(structure.has_block(&UsageKey::from("unit")));
    }
}
