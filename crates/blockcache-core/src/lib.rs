//! Blockcache Core: shared types, collaborator traits, and errors.
//!
//! This crate provides the foundational types used across all blockcache
//! crates. It has no internal blockcache dependencies.
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`key`]: Block identity (`BlockKey`, `UsageKey`)
//! - [`traits`]: Content store, cache store, and user traits
//! - [`memory`]: In-memory cache store
//! - `mock`: Mock content store (feature `test-utils`)

pub mod error;
pub mod key;
pub mod memory;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use key::{BlockKey, UsageKey};
pub use memory::MemoryCache;
pub use traits::{CacheStore, ContentBlock, ContentStore, UserInfo};
