//! Transformer pipeline.
//!
//! A [`BlockTransformer`] contributes two steps:
//!
//! - `collect()`: user-independent work run once per cached snapshot. It
//!   reads raw blocks through the [`CollectionContext`] and records whatever
//!   data its apply step will need.
//! - `apply()`: per-request work that filters a (possibly cached) structure
//!   for one user, typically by removing blocks.
//!
//! The [`TransformerRegistry`] runs collect across every registered
//! transformer in registration order and stamps each one's version into the
//! structure. At apply time it checks that stamp before handing the
//! structure to a transformer, so a transformer never reads data it did not
//! collect.
//!
//! Errors from a transformer abort the whole phase and are returned as-is.

use blockcache_core::{BlockKey, Error, Result};
use log::debug;

use crate::collection::CollectionContext;
use crate::structure::BlockStructure;

/// A pluggable unit of collect + apply logic.
///
/// `K` is the block identity type, `U` the user type apply filters for.
/// Structure data is namespaced by [`name`](Self::name), and
/// [`version`](Self::version) must be bumped whenever the shape of collected
/// data changes so cached structures are invalidated.
pub trait BlockTransformer<K: BlockKey, U: ?Sized>: Send + Sync {
    /// Unique name; also the namespace for this transformer's data.
    fn name(&self) -> &str;

    /// Positive version of the collected data format.
    fn version(&self) -> u32;

    /// Collect user-independent data.
    ///
    /// Parents are always collected before their children when a
    /// transformer walks the context in topological order.
    fn collect(&self, ctx: &mut CollectionContext<K>) -> Result<()>;

    /// Filter `structure` for `user`.
    ///
    /// With `remove_orphans`, blocks left without parents by a removal are
    /// removed too.
    fn apply(&self, user: &U, structure: &mut BlockStructure<K>, remove_orphans: bool)
    -> Result<()>;
}

/// Ordered set of uniquely named transformers.
pub struct TransformerRegistry<K: BlockKey, U: ?Sized> {
    transformers: Vec<Box<dyn BlockTransformer<K, U>>>,
}

impl<K: BlockKey, U: ?Sized> Default for TransformerRegistry<K, U> {
    fn default() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }
}

impl<K: BlockKey, U: ?Sized> TransformerRegistry<K, U> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer.
    ///
    /// Fails if the version is 0 (reserved for "never collected") or if a
    /// transformer with the same name is already registered.
    pub fn register<T>(&mut self, transformer: T) -> Result<()>
    where
        T: BlockTransformer<K, U> + 'static,
    {
        self.register_boxed(Box::new(transformer))
    }

    /// Register an already boxed transformer.
    pub fn register_boxed(&mut self, transformer: Box<dyn BlockTransformer<K, U>>) -> Result<()> {
        let name = transformer.name();
        if transformer.version() == 0 {
            return Err(Error::invalid_transformer(name, "version must be positive"));
        }
        if self.contains(name) {
            return Err(Error::invalid_transformer(name, "name is already registered"));
        }
        debug!("Registered transformer '{}' (v{})", name, transformer.version());
        self.transformers.push(transformer);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T>(mut self, transformer: T) -> Result<Self>
    where
        T: BlockTransformer<K, U> + 'static,
    {
        self.register(transformer)?;
        Ok(self)
    }

    /// Look up a transformer by name.
    pub fn get(&self, name: &str) -> Option<&dyn BlockTransformer<K, U>> {
        self.transformers
            .iter()
            .find(|t| t.name() == name)
            .map(|t| &**t)
    }

    /// Whether a transformer named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered transformers, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn BlockTransformer<K, U>> {
        self.transformers.iter().map(|t| &**t)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|t| t.name()).collect()
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Fail with [`Error::UnknownTransformer`] for the first name that is
    /// not registered.
    pub fn validate_names<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        match names.iter().find(|name| !self.contains(name.as_ref())) {
            Some(unknown) => Err(Error::UnknownTransformer(unknown.as_ref().to_string())),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Collect phase
    // ------------------------------------------------------------------------

    /// Run every transformer's collect step, stamp versions, then capture
    /// the raw fields they requested.
    pub fn collect(&self, ctx: &mut CollectionContext<K>) -> Result<()> {
        for transformer in &self.transformers {
            debug!(
                "Collecting '{}' for structure rooted at {}",
                transformer.name(),
                ctx.root()
            );
            transformer.collect(ctx)?;
            ctx.stamp_version(transformer.name(), transformer.version());
        }
        ctx.collect_requested_fields();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Apply phase
    // ------------------------------------------------------------------------

    /// Apply every registered transformer for `user`.
    pub fn transform(
        &self,
        user: &U,
        structure: &mut BlockStructure<K>,
        remove_orphans: bool,
    ) -> Result<()> {
        for transformer in &self.transformers {
            Self::apply_one(&**transformer, user, structure, remove_orphans)?;
        }
        Ok(())
    }

    /// Apply the named transformers for `user`, in registration order.
    ///
    /// All names are validated before any transformer runs.
    pub fn transform_subset<S: AsRef<str>>(
        &self,
        user: &U,
        structure: &mut BlockStructure<K>,
        names: &[S],
        remove_orphans: bool,
    ) -> Result<()> {
        self.validate_names(names)?;
        let selected = self
            .transformers
            .iter()
            .filter(|t| names.iter().any(|name| name.as_ref() == t.name()));
        for transformer in selected {
            Self::apply_one(&**transformer, user, structure, remove_orphans)?;
        }
        Ok(())
    }

    fn apply_one(
        transformer: &dyn BlockTransformer<K, U>,
        user: &U,
        structure: &mut BlockStructure<K>,
        remove_orphans: bool,
    ) -> Result<()> {
        let name = transformer.name();
        match structure.get_transformer_data_version(name) {
            0 => return Err(Error::missing_version(name)),
            stamped if stamped != transformer.version() => {
                return Err(Error::invalid_data(format!(
                    "transformer '{name}' data was collected at version {stamped}, \
                     current version is {}",
                    transformer.version()
                )));
            }
            _ => {}
        }

        let before = structure.len();
        transformer.apply(user, structure, remove_orphans)?;
        debug!(
            "Applied '{}': {} -> {} block(s)",
            name,
            before,
            structure.len()
        );
        Ok(())
    }
}

impl<K: BlockKey, U: ?Sized> std::fmt::Debug for TransformerRegistry<K, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("transformers", &self.names())
            .finish()
    }
}

// ============================================================================
// Mock implementation for testing
// ============================================================================

/// Mock transformer for testing.
///
/// Records a marker during collect and removes the configured blocks
/// (matched by cache key) during apply. Calls are counted, and either step
/// can be made to fail.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Structure-wide key the mock writes during collect.
    pub const COLLECTED_KEY: &str = "collected";

    /// Which step should fail.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum FailOn {
        /// `collect()` returns an error.
        Collect,
        /// `apply()` returns an error.
        Apply,
    }

    /// Configurable mock transformer.
    #[derive(Debug)]
    pub struct MockTransformer {
        name: String,
        version: u32,
        remove: Vec<String>,
        fail_on: Option<FailOn>,
        collect_calls: AtomicUsize,
        apply_calls: AtomicUsize,
    }

    impl MockTransformer {
        /// Create a mock with the given name and version.
        pub fn new(name: impl Into<String>, version: u32) -> Self {
            Self {
                name: name.into(),
                version,
                remove: Vec::new(),
                fail_on: None,
                collect_calls: AtomicUsize::new(0),
                apply_calls: AtomicUsize::new(0),
            }
        }

        /// Blocks to remove during apply, by cache key.
        pub fn removing(mut self, keys: &[&str]) -> Self {
            self.remove = keys.iter().map(|k| k.to_string()).collect();
            self
        }

        /// Make one step fail.
        pub fn failing_on(mut self, step: FailOn) -> Self {
            self.fail_on = Some(step);
            self
        }

        /// Number of `collect()` calls.
        pub fn collect_calls(&self) -> usize {
            self.collect_calls.load(Ordering::SeqCst)
        }

        /// Number of `apply()` calls.
        pub fn apply_calls(&self) -> usize {
            self.apply_calls.load(Ordering::SeqCst)
        }
    }

    impl<K: BlockKey, U: ?Sized> BlockTransformer<K, U> for MockTransformer {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> u32 {
            self.version
        }

        fn collect(&self, ctx: &mut CollectionContext<K>) -> Result<()> {
            self.collect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(FailOn::Collect) {
                return Err(Error::transformer(&self.name, "collect failed"));
            }
            ctx.set_transformer_data(&self.name, COLLECTED_KEY, &true)
        }

        fn apply(
            &self,
            _user: &U,
            structure: &mut BlockStructure<K>,
            remove_orphans: bool,
        ) -> Result<()> {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(FailOn::Apply) {
                return Err(Error::transformer(&self.name, "apply failed"));
            }
            structure.remove_block_if_with_orphans(
                |key| self.remove.contains(&key.cache_key()),
                remove_orphans,
            );
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::mock::{COLLECTED_KEY, FailOn, MockTransformer};
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;

    /// Shared handle so tests can inspect call counts after registering.
    struct Shared(Arc<MockTransformer>);

    impl BlockTransformer<String, str> for Shared {
        fn name(&self) -> &str {
            BlockTransformer::<String, str>::name(self.0.as_ref())
        }

        fn version(&self) -> u32 {
            BlockTransformer::<String, str>::version(self.0.as_ref())
        }

        fn collect(&self, ctx: &mut CollectionContext<String>) -> Result<()> {
            BlockTransformer::<String, str>::collect(self.0.as_ref(), ctx)
        }

        fn apply(
            &self,
            user: &str,
            structure: &mut BlockStructure<String>,
            remove_orphans: bool,
        ) -> Result<()> {
            self.0.apply(user, structure, remove_orphans)
        }
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    /// course -> a -> b, course -> c
    fn context() -> CollectionContext<String> {
        let mut ctx = CollectionContext::new(key("course"));
        ctx.add_relation(&key("course"), &key("a"));
        ctx.add_relation(&key("a"), &key("b"));
        ctx.add_relation(&key("course"), &key("c"));
        ctx
    }

    fn collected(registry: &TransformerRegistry<String, str>) -> BlockStructure<String> {
        let mut ctx = context();
        registry.collect(&mut ctx).unwrap();
        ctx.into_structure()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    #[test]
    fn test_register_rejects_version_zero() {
        let mut registry: TransformerRegistry<String, str> = TransformerRegistry::new();
        let err = registry
            .register(MockTransformer::new("visibility", 0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransformer { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate_name() {
        let mut registry: TransformerRegistry<String, str> = TransformerRegistry::new();
        registry.register(MockTransformer::new("visibility", 1)).unwrap();
        let err = registry
            .register(MockTransformer::new("visibility", 2))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransformer { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_lookup() {
        let registry: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 1))
            .unwrap()
            .with(MockTransformer::new("start_date", 2))
            .unwrap();

        assert_eq!(registry.names(), vec!["visibility", "start_date"]);
        assert!(registry.contains("start_date"));
        assert!(!registry.contains("grades"));
        assert_eq!(registry.get("start_date").map(|t| t.version()), Some(2));
        assert!(registry.validate_names(&["visibility"]).is_ok());
        assert!(matches!(
            registry.validate_names(&["visibility", "grades"]),
            Err(Error::UnknownTransformer(name)) if name == "grades"
        ));
    }

    // ------------------------------------------------------------------------
    // Collect
    // ------------------------------------------------------------------------

    #[test]
    fn test_collect_stamps_versions() {
        let registry: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 1))
            .unwrap()
            .with(MockTransformer::new("start_date", 4))
            .unwrap();

        let structure = collected(&registry);
        assert_eq!(structure.get_transformer_data_version("visibility"), 1);
        assert_eq!(structure.get_transformer_data_version("start_date"), 4);
        assert_eq!(
            structure.get_transformer_data("visibility", COLLECTED_KEY),
            Some(&Value::from(true))
        );
    }

    #[test]
    fn test_collect_failure_aborts_remaining() {
        let failing = Arc::new(MockTransformer::new("visibility", 1).failing_on(FailOn::Collect));
        let later = Arc::new(MockTransformer::new("start_date", 1));
        let mut registry: TransformerRegistry<String, str> = TransformerRegistry::new();
        registry.register(Shared(failing.clone())).unwrap();
        registry.register(Shared(later.clone())).unwrap();

        let mut ctx = context();
        let err = registry.collect(&mut ctx).unwrap_err();

        assert!(err.is_transformer_failure());
        assert_eq!(failing.collect_calls(), 1);
        assert_eq!(later.collect_calls(), 0);
        assert_eq!(ctx.get_transformer_data_version("visibility"), 0);
    }

    // ------------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------------

    #[test]
    fn test_transform_applies_all() {
        let registry: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 1).removing(&["c"]))
            .unwrap()
            .with(MockTransformer::new("start_date", 1).removing(&["b"]))
            .unwrap();

        let mut structure = collected(&registry);
        registry.transform("learner", &mut structure, true).unwrap();

        assert!(!structure.has_block(&key("b")));
        assert!(!structure.has_block(&key("c")));
        assert!(structure.has_block(&key("a")));
    }

    #[test]
    fn test_transform_subset_applies_only_requested() {
        let registry: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 1).removing(&["c"]))
            .unwrap()
            .with(MockTransformer::new("start_date", 1).removing(&["b"]))
            .unwrap();

        let mut structure = collected(&registry);
        registry
            .transform_subset("learner", &mut structure, &["start_date"], true)
            .unwrap();

        assert!(!structure.has_block(&key("b")));
        assert!(structure.has_block(&key("c")));
    }

    #[test]
    fn test_transform_subset_rejects_unknown_before_running() {
        let visibility = Arc::new(MockTransformer::new("visibility", 1));
        let mut registry: TransformerRegistry<String, str> = TransformerRegistry::new();
        registry.register(Shared(visibility.clone())).unwrap();

        let mut structure = collected(&registry);
        let err = registry
            .transform_subset("learner", &mut structure, &["visibility", "grades"], true)
            .unwrap_err();

        assert!(matches!(err, Error::UnknownTransformer(_)));
        assert_eq!(visibility.apply_calls(), 0);
    }

    #[test]
    fn test_transform_without_collect_is_missing_version() {
        let registry: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 1))
            .unwrap();

        let mut structure = context().into_structure();
        let err = registry
            .transform("learner", &mut structure, true)
            .unwrap_err();
        assert!(
            matches!(err, Error::MissingVersion { transformer } if transformer == "visibility")
        );
    }

    #[test]
    fn test_transform_with_outdated_stamp_fails() {
        let old: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 1))
            .unwrap();
        let new: TransformerRegistry<String, str> = TransformerRegistry::new()
            .with(MockTransformer::new("visibility", 2))
            .unwrap();

        let mut structure = collected(&old);
        let err = new.transform("learner", &mut structure, true).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_apply_failure_aborts_remaining() {
        let failing = Arc::new(MockTransformer::new("visibility", 1).failing_on(FailOn::Apply));
        let later = Arc::new(MockTransformer::new("start_date", 1).removing(&["c"]));
        let mut registry: TransformerRegistry<String, str> = TransformerRegistry::new();
        registry.register(Shared(failing.clone())).unwrap();
        registry.register(Shared(later.clone())).unwrap();

        let mut structure = collected(&registry);
        let err = registry
            .transform("learner", &mut structure, true)
            .unwrap_err();

        assert!(matches!(err, Error::Transformer { ref name, .. } if name == "visibility"));
        assert_eq!(later.apply_calls(), 0);
        assert!(structure.has_block(&key("c")));
    }
}
