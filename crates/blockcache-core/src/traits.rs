//! Collaborator traits.
//!
//! These traits describe the external systems blockcache talks to: the
//! backing content store that supplies raw blocks, the key/value cache that
//! holds collected structures, and the user a structure is filtered for.
//! Implementations live in the application; this crate only ships an
//! in-memory cache and (behind `test-utils`) a mock content store.

use std::collections::HashMap;

use serde_json::Value;

use crate::Result;
use crate::key::BlockKey;

// ============================================================================
// Content store
// ============================================================================

/// A raw block as read from the backing content store.
///
/// Field access is by name, and absent attributes return `None`.
pub trait ContentBlock<K: BlockKey> {
    /// Identity of this block.
    fn key(&self) -> K;

    /// Read a named attribute of this block.
    fn field(&self, name: &str) -> Option<Value>;
}

/// The backing store that raw blocks are read from.
///
/// Calls may be slow (network or disk); timeouts are the implementation's
/// concern.
pub trait ContentStore<K: BlockKey> {
    /// The raw block type this store produces.
    type Block: ContentBlock<K> + 'static;

    /// Fetch the root block of a structure.
    fn get_root_block(&self, root: &K) -> Result<Self::Block>;

    /// Fetch the children of a block, in their authored order.
    fn get_children(&self, block: &Self::Block) -> Result<Vec<Self::Block>>;
}

// ============================================================================
// Cache store
// ============================================================================

/// A shared key/value cache holding serialized structures.
///
/// Keys are strings; values are opaque byte blobs. The store is responsible
/// for its own per-key atomicity and eviction policy.
pub trait CacheStore: Send + Sync {
    /// Read a single entry.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a single entry.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Read many entries. Missing keys are simply absent from the result.
    ///
    /// Default implementation calls `get` for each key. Backends with
    /// native multi-get should override this.
    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Write many entries.
    ///
    /// Default implementation calls `set` for each entry.
    fn set_many(&self, entries: HashMap<String, Vec<u8>>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Delete an entry. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

// ============================================================================
// User
// ============================================================================

/// The user a structure is being filtered for.
pub trait UserInfo {
    /// A stable identifier for logging.
    fn username(&self) -> &str;

    /// Whether the user has staff access to the course.
    ///
    /// Staff users bypass per-learner visibility rules.
    fn has_staff_access(&self) -> bool {
        false
    }
}
