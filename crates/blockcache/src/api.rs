//! Request-level entry point.
//!
//! [`BlockCache`] ties the pieces together for a request handler: it loads
//! the collected structure for a root from the cache (building, collecting,
//! and caching it on a miss) and then filters a private copy for the
//! requesting user.

use std::sync::Arc;

use blockcache_core::{BlockKey, CacheStore, ContentStore, Result};
use blockcache_graph::{BlockStructure, BlockStructureFactory, TransformerRegistry};
use log::debug;

use crate::config::{BlockCacheConfig, TransformConfig};

/// Cached, per-user block structures.
pub struct BlockCache<K: BlockKey, U: ?Sized> {
    cache: Arc<dyn CacheStore>,
    registry: TransformerRegistry<K, U>,
    factory: BlockStructureFactory,
    transform: TransformConfig,
}

impl<K: BlockKey, U: ?Sized> BlockCache<K, U> {
    /// Create a block cache with default configuration.
    pub fn new(cache: Arc<dyn CacheStore>, registry: TransformerRegistry<K, U>) -> Self {
        let config = BlockCacheConfig::default();
        Self {
            cache,
            registry,
            factory: config.factory(),
            transform: config.transform,
        }
    }

    /// Create a block cache from loaded configuration.
    ///
    /// Fails if the configured default transformers are not all registered.
    pub fn with_config(
        cache: Arc<dyn CacheStore>,
        registry: TransformerRegistry<K, U>,
        config: &BlockCacheConfig,
    ) -> Result<Self> {
        registry.validate_names(&config.transform.transformers)?;
        Ok(Self {
            cache,
            registry,
            factory: config.factory(),
            transform: config.transform.clone(),
        })
    }

    /// The registered transformers.
    pub fn registry(&self) -> &TransformerRegistry<K, U> {
        &self.registry
    }

    /// The factory used for cache keys and (de)serialization.
    pub fn factory(&self) -> &BlockStructureFactory {
        &self.factory
    }

    /// The structure for `root` filtered for `user`.
    ///
    /// `transformers` names the transformers to apply; `None` uses the
    /// configured default (all registered when none is configured). Names
    /// are validated before the cache or content store is touched.
    pub fn get_blocks<S>(
        &self,
        store: &S,
        user: &U,
        root: &K,
        transformers: Option<&[&str]>,
    ) -> Result<BlockStructure<K>>
    where
        S: ContentStore<K>,
    {
        match transformers {
            Some(names) => self.registry.validate_names(names)?,
            None => self.registry.validate_names(&self.transform.transformers)?,
        }

        let mut structure = self.get_collected(store, root)?;
        let remove_orphans = self.transform.remove_orphans;

        match transformers {
            Some(names) => {
                self.registry
                    .transform_subset(user, &mut structure, names, remove_orphans)?;
            }
            None if self.transform.transformers.is_empty() => {
                self.registry.transform(user, &mut structure, remove_orphans)?;
            }
            None => {
                self.registry.transform_subset(
                    user,
                    &mut structure,
                    &self.transform.transformers,
                    remove_orphans,
                )?;
            }
        }
        Ok(structure)
    }

    /// The collected, unfiltered structure for `root`.
    ///
    /// Served from the cache when every registered transformer's version
    /// matches; otherwise built from `store`, collected, and cached.
    pub fn get_collected<S>(&self, store: &S, root: &K) -> Result<BlockStructure<K>>
    where
        S: ContentStore<K>,
    {
        if let Some(structure) =
            self.factory
                .create_from_cache(root, self.cache.as_ref(), &self.registry)?
        {
            return Ok(structure);
        }

        debug!("Collecting structure for {}", root);
        let mut ctx = self.factory.create_from_store(root, store)?;
        self.registry.collect(&mut ctx)?;
        let structure = ctx.into_structure();
        self.factory
            .serialize_to_cache(&structure, self.cache.as_ref())?;
        Ok(structure)
    }

    /// Invalidate the cached structure for `root`.
    pub fn clear(&self, root: &K) -> Result<()> {
        self.factory.remove_from_cache(root, self.cache.as_ref())
    }
}

impl<K: BlockKey, U: ?Sized> std::fmt::Debug for BlockCache<K, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("registry", &self.registry)
            .field("factory", &self.factory)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use blockcache_core::mock::{MockBlock, MockContentStore};
    use blockcache_core::{Error, MemoryCache, UsageKey, UserInfo};
    use blockcache_graph::transformer::mock::MockTransformer;
    use blockcache_transformers::access::{GroupId, PartitionId};
    use blockcache_transformers::{PartitionMembership, UserPartition, UserPartitionTransformer};
    use serde_json::json;
    use std::collections::HashMap;

    struct Learner {
        groups: HashMap<PartitionId, GroupId>,
    }

    impl Learner {
        fn in_group(group: GroupId) -> Self {
            Self {
                groups: HashMap::from([(1, group)]),
            }
        }
    }

    impl UserInfo for Learner {
        fn username(&self) -> &str {
            "learner"
        }
    }

    impl PartitionMembership for Learner {
        fn group_for_partition(&self, partition: &UserPartition) -> Option<GroupId> {
            self.groups.get(&partition.id).copied()
        }
    }

    fn key(s: &str) -> UsageKey {
        UsageKey::from(s)
    }

    /// course -> A -> B, course -> C; A is restricted to group 1.
    fn store() -> MockContentStore {
        MockContentStore::new()
            .with_block(
                MockBlock::new("course")
                    .with_field(
                        "user_partitions",
                        json!([{
                            "id": 1,
                            "name": "Cohorts",
                            "groups": [{"id": 1, "name": "One"}, {"id": 2, "name": "Two"}]
                        }]),
                    )
                    .with_children(&["A", "C"]),
            )
            .with_block(
                MockBlock::new("A")
                    .with_field("group_access", json!({"1": [1]}))
                    .with_children(&["B"]),
            )
            .with_block(MockBlock::new("B"))
            .with_block(MockBlock::new("C").with_field("display_name", "Syllabus"))
    }

    fn registry(mock_version: u32) -> TransformerRegistry<UsageKey, Learner> {
        TransformerRegistry::new()
            .with(UserPartitionTransformer::new())
            .unwrap()
            .with(MockTransformer::new("visibility", mock_version).removing(&["C"]))
            .unwrap()
    }

    fn block_cache(cache: &Arc<MemoryCache>) -> BlockCache<UsageKey, Learner> {
        BlockCache::new(cache.clone(), registry(1))
    }

    #[test]
    fn test_get_blocks_builds_then_serves_from_cache() {
        let cache = Arc::new(MemoryCache::new());
        let blocks = block_cache(&cache);
        let store = store();

        blocks
            .get_blocks(&store, &Learner::in_group(1), &key("course"), None)
            .unwrap();
        let fetches = store.children_fetches();
        assert_eq!(fetches, 4);
        assert!(cache.contains_key("root.key.course"));

        blocks
            .get_blocks(&store, &Learner::in_group(1), &key("course"), None)
            .unwrap();
        assert_eq!(store.children_fetches(), fetches);
    }

    #[test]
    fn test_get_blocks_filters_per_user() {
        let cache = Arc::new(MemoryCache::new());
        let blocks = block_cache(&cache);
        let store = store();

        let member = blocks
            .get_blocks(&store, &Learner::in_group(1), &key("course"), None)
            .unwrap();
        assert!(member.has_block(&key("B")));
        assert!(!member.has_block(&key("C")));

        let other = blocks
            .get_blocks(&store, &Learner::in_group(2), &key("course"), None)
            .unwrap();
        assert!(!other.has_block(&key("A")));
        assert!(!other.has_block(&key("B")));

        // The cached snapshot is never filtered.
        let collected = blocks.get_collected(&store, &key("course")).unwrap();
        assert_eq!(collected.len(), 4);
    }

    #[test]
    fn test_get_blocks_with_subset() {
        let cache = Arc::new(MemoryCache::new());
        let blocks = block_cache(&cache);

        let structure = blocks
            .get_blocks(
                &store(),
                &Learner::in_group(2),
                &key("course"),
                Some(&["visibility"]),
            )
            .unwrap();
        assert!(structure.has_block(&key("A")));
        assert!(!structure.has_block(&key("C")));

        let untouched = blocks
            .get_blocks(&store(), &Learner::in_group(2), &key("course"), Some(&[]))
            .unwrap();
        assert_eq!(untouched.len(), 4);
    }

    #[test]
    fn test_get_blocks_rejects_unknown_transformer_first() {
        let cache = Arc::new(MemoryCache::new());
        let blocks = block_cache(&cache);
        let store = store();

        let err = blocks
            .get_blocks(
                &store,
                &Learner::in_group(1),
                &key("course"),
                Some(&["grades"]),
            )
            .unwrap_err();

        assert!(matches!(err, Error::UnknownTransformer(ref name) if name == "grades"));
        assert_eq!(store.children_fetches(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_forces_rebuild() {
        let cache = Arc::new(MemoryCache::new());
        let blocks = block_cache(&cache);
        let store = store();

        blocks.get_collected(&store, &key("course")).unwrap();
        blocks.clear(&key("course")).unwrap();
        assert!(!cache.contains_key("root.key.course"));

        blocks.get_collected(&store, &key("course")).unwrap();
        assert_eq!(store.children_fetches(), 8);
    }

    #[test]
    fn test_version_bump_recollects() {
        let cache = Arc::new(MemoryCache::new());
        let store = store();
        block_cache(&cache)
            .get_collected(&store, &key("course"))
            .unwrap();

        let upgraded: BlockCache<UsageKey, Learner> =
            BlockCache::new(cache.clone(), registry(2));
        let structure = upgraded.get_collected(&store, &key("course")).unwrap();

        assert_eq!(store.children_fetches(), 8);
        assert_eq!(structure.get_transformer_data_version("visibility"), 2);
    }

    #[test]
    fn test_authoring_change_is_picked_up_after_version_bump() {
        let cache = Arc::new(MemoryCache::new());
        let mut store = store();
        let learner = Learner::in_group(2);
        let before = block_cache(&cache)
            .get_blocks(&store, &learner, &key("course"), None)
            .unwrap();
        assert!(!before.has_block(&key("A")));

        // A is opened to group 2; the old snapshot still serves group 1 only.
        store.put_block(
            MockBlock::new("A")
                .with_field("group_access", json!({"1": [1, 2]}))
                .with_children(&["B"]),
        );
        let stale = block_cache(&cache)
            .get_blocks(&store, &learner, &key("course"), None)
            .unwrap();
        assert!(!stale.has_block(&key("A")));

        let upgraded: BlockCache<UsageKey, Learner> =
            BlockCache::new(cache.clone(), registry(2));
        let after = upgraded
            .get_blocks(&store, &learner, &key("course"), None)
            .unwrap();
        assert!(after.has_block(&key("A")));
        assert!(after.has_block(&key("B")));
    }

    #[test]
    fn test_subtree_request_does_not_leak_into_course_view() {
        let cache = Arc::new(MemoryCache::new());
        let blocks = block_cache(&cache);
        let store = store();
        let outsider = Learner::in_group(2);

        let course = blocks
            .get_blocks(&store, &outsider, &key("course"), None)
            .unwrap();
        assert!(!course.has_block(&key("A")));

        // Rooted at A, nothing above A restricts it.
        let subtree = blocks.get_blocks(&store, &outsider, &key("A"), None).unwrap();
        assert!(subtree.has_block(&key("A")));

        let course = blocks
            .get_blocks(&store, &outsider, &key("course"), None)
            .unwrap();
        assert!(!course.has_block(&key("A")));
        assert!(!course.has_block(&key("B")));
    }

    #[test]
    fn test_with_config() {
        let cache = Arc::new(MemoryCache::new());
        let mut config = BlockCacheConfig::default();
        config.cache.root_key_prefix = "course.".to_string();
        config.transform.remove_orphans = false;
        config.transform.transformers = vec!["user_partitions".to_string()];

        let blocks = BlockCache::with_config(cache.clone(), registry(1), &config).unwrap();
        let structure = blocks
            .get_blocks(&store(), &Learner::in_group(2), &key("course"), None)
            .unwrap();

        assert!(cache.contains_key("course.course"));
        // Only user_partitions ran, without orphan removal.
        assert!(structure.has_block(&key("C")));
        assert!(!structure.has_block(&key("A")));
        assert!(structure.has_block(&key("B")));
    }

    #[test]
    fn test_with_config_rejects_unknown_default() {
        let mut config = BlockCacheConfig::default();
        config.transform.transformers = vec!["grades".to_string()];

        let result = BlockCache::with_config(Arc::new(MemoryCache::new()), registry(1), &config);
        assert!(matches!(result, Err(Error::UnknownTransformer(_))));
    }
}
