//! Mock content store for testing.
//!
//! Blocks are declared up front with their fields and child keys. The store
//! counts how often children are fetched so tests can assert that a builder
//! visits each block exactly once.
//!
//! ```rust,ignore
//! use blockcache_core::mock::{MockBlock, MockContentStore};
//!
//! let store = MockContentStore::new()
//!     .with_block(MockBlock::new("course").with_children(&["chapter"]))
//!     .with_block(MockBlock::new("chapter").with_field("display_name", "Intro"));
//! assert_eq!(store.len(), 2);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::key::UsageKey;
use crate::traits::{ContentBlock, ContentStore};
use crate::{Error, Result};

/// A raw block held by [`MockContentStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct MockBlock {
    /// Block identity.
    pub key: UsageKey,
    /// Named attributes.
    pub fields: HashMap<String, Value>,
    /// Child identities, in authored order.
    pub children: Vec<UsageKey>,
}

impl MockBlock {
    /// Create a block with no fields and no children.
    pub fn new(key: impl Into<UsageKey>) -> Self {
        Self {
            key: key.into(),
            fields: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Set a named attribute.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the child identities.
    pub fn with_children(mut self, children: &[&str]) -> Self {
        self.children = children.iter().map(|c| UsageKey::from(*c)).collect();
        self
    }
}

impl ContentBlock<UsageKey> for MockBlock {
    fn key(&self) -> UsageKey {
        self.key.clone()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }
}

/// An in-memory content store with a fetch counter.
#[derive(Debug, Default)]
pub struct MockContentStore {
    blocks: HashMap<UsageKey, MockBlock>,
    children_fetches: AtomicUsize,
}

impl MockContentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a block.
    pub fn with_block(mut self, block: MockBlock) -> Self {
        self.blocks.insert(block.key.clone(), block);
        self
    }

    /// Replace a block in place, e.g. to simulate an authoring change.
    pub fn put_block(&mut self, block: MockBlock) {
        self.blocks.insert(block.key.clone(), block);
    }

    /// Number of declared blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are declared.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// How many times `get_children` has been called.
    pub fn children_fetches(&self) -> usize {
        self.children_fetches.load(Ordering::SeqCst)
    }

    fn lookup(&self, key: &UsageKey) -> Result<MockBlock> {
        self.blocks
            .get(key)
            .cloned()
            .ok_or_else(|| Error::content_store(format!("no block '{key}' in store")))
    }
}

impl ContentStore<UsageKey> for MockContentStore {
    type Block = MockBlock;

    fn get_root_block(&self, root: &UsageKey) -> Result<MockBlock> {
        self.blocks
            .get(root)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("root block '{root}'")))
    }

    fn get_children(&self, block: &MockBlock) -> Result<Vec<MockBlock>> {
        self.children_fetches.fetch_add(1, Ordering::SeqCst);
        block.children.iter().map(|key| self.lookup(key)).collect()
    }
}
