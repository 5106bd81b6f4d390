//! Block graph infrastructure for blockcache.
//!
//! This crate provides the block DAG, its topological traversal, the
//! transformer pipeline, and the factory that builds structures from a
//! content store and moves them in and out of a cache.
//!
//! # Features
//!
//! - `test-utils`: Expose `transformer::mock::MockTransformer` (and the
//!   core mock content store) to downstream crates' tests
//!
//! # Key Abstractions
//!
//! - `BlockStructure`: a rooted DAG plus per-block and per-transformer data
//! - `CollectionContext`: the collect-phase view with raw block access
//! - `BlockTransformer` trait: pluggable collect + apply logic
//! - `BlockStructureFactory`: content store → structure → cache → structure

pub mod collection;
pub mod factory;
pub mod graph;
pub mod structure;
pub mod transformer;
pub mod traversal;

#[cfg(test)]
mod testing;

pub use collection::CollectionContext;
pub use factory::{BlockStructureFactory, DEFAULT_ROOT_KEY_PREFIX};
pub use graph::{BlockGraph, BlockRelations};
pub use structure::{BlockData, BlockStructure, TRANSFORMER_VERSION_KEY, TransformerData};
pub use transformer::{BlockTransformer, TransformerRegistry};
pub use traversal::{TopologicalTraversal, traverse_topologically};
