//! Block identity.
//!
//! Blocks are identified by values supplied from outside (the content store
//! decides what a block's identity is). The graph only needs equality,
//! hashing, and a stable string form to build cache keys from.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Identity of a block within a structure.
///
/// Any type that is hashable, comparable, and serializable can serve as a
/// block identity. The [`cache_key`](BlockKey::cache_key) encoding must be
/// stable across processes because it addresses entries in a shared cache.
pub trait BlockKey:
    Clone
    + Eq
    + Hash
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Stable string encoding used to build cache keys.
    ///
    /// Default: the `Display` form.
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl BlockKey for String {}

impl BlockKey for u64 {}

/// A string usage key, e.g. `block-v1:org+course+run+type@chapter+block@intro`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageKey(String);

impl UsageKey {
    /// Create a usage key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The string form of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UsageKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for UsageKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl BlockKey for UsageKey {}
