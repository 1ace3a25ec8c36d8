use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ogm_backend::{GraphBackend, KvBackend, DEFAULT_CACHE_CAPACITY};

use crate::direct::DirectWriteStore;
use crate::error::{StoreError, StoreResult};
use crate::layers::{
    AutocommitLayer, FeatureCacheLayer, IsSetCacheLayer, LoadCounter, LoadedObjectsLayer, LoggingLayer,
    SizeCacheLayer,
};
use crate::long_list::LongListStore;
use crate::map::MapStore;
use crate::pipeline::StorePipeline;
use crate::traits::PersistentStore;

/// Default number of mutations between automatic commits.
pub const DEFAULT_AUTOCOMMIT_CHUNK: usize = 50_000;

/// How many-valued references are laid out in a graph backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mapping {
    /// Positional edges and properties.
    #[default]
    DirectWrite,
    /// Linked list nodes hanging off a base node.
    LongList,
}

/// An optional pipeline layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CacheIsSet,
    CacheFeatures,
    CacheSizes,
    Log,
    CountLoadedObjects,
}

/// Declarative description of a store and its layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub mapping: Mapping,
    pub capabilities: Vec<Capability>,
    /// Commit the backend every this many mutations.
    pub autocommit: Option<usize>,
    /// Capacity of each caching layer.
    pub cache_capacity: usize,
    /// Resource objects are attached to when reified.
    pub resource: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mapping: Mapping::DirectWrite,
            capabilities: Vec::new(),
            autocommit: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            resource: None,
        }
    }
}

impl StoreOptions {
    pub fn builder() -> StoreOptionsBuilder {
        StoreOptionsBuilder::default()
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let options: Self = toml::from_str(s).map_err(|e| StoreError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> StoreResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidOptions(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.autocommit == Some(0) {
            return Err(StoreError::InvalidOptions("autocommit chunk must be positive".into()));
        }
        if self.cache_capacity == 0 {
            return Err(StoreError::InvalidOptions("cache capacity must be positive".into()));
        }
        Ok(())
    }

    /// Open a store over a graph backend using the configured mapping.
    pub fn open_graph(&self, backend: GraphBackend) -> StoreResult<StorePipeline> {
        self.validate()?;
        let mut direct = DirectWriteStore::new(backend);
        if let Some(resource) = &self.resource {
            direct = direct.with_resource(resource.clone());
        }
        let store: Box<dyn PersistentStore> = match self.mapping {
            Mapping::DirectWrite => Box::new(direct),
            Mapping::LongList => Box::new(LongListStore::from_direct(direct)),
        };
        self.assemble(store)
    }

    /// Open a store over a key-value backend.
    pub fn open_map(&self, backend: KvBackend) -> StoreResult<StorePipeline> {
        self.validate()?;
        if self.mapping == Mapping::LongList {
            return Err(StoreError::InvalidOptions(
                "long-list mapping needs a graph backend".into(),
            ));
        }
        let mut store = MapStore::new(backend);
        if let Some(resource) = &self.resource {
            store = store.with_resource(resource.clone());
        }
        self.assemble(Box::new(store))
    }

    /// Wrap `store` in the enabled layers.
    ///
    /// Innermost to outermost: autocommit, is-set cache, feature cache,
    /// size cache, logging, loaded-object counting.
    fn assemble(&self, store: Box<dyn PersistentStore>) -> StoreResult<StorePipeline> {
        let mut pipeline = StorePipeline::new(store);
        if let Some(chunk) = self.autocommit {
            pipeline.wrap(Box::new(AutocommitLayer::new(chunk)?));
        }
        if self.has(Capability::CacheIsSet) {
            pipeline.wrap(Box::new(IsSetCacheLayer::new(self.cache_capacity)));
        }
        if self.has(Capability::CacheFeatures) {
            pipeline.wrap(Box::new(FeatureCacheLayer::new(self.cache_capacity)));
        }
        if self.has(Capability::CacheSizes) {
            pipeline.wrap(Box::new(SizeCacheLayer::new(self.cache_capacity)));
        }
        if self.has(Capability::Log) {
            pipeline.wrap(Box::new(LoggingLayer));
        }
        if self.has(Capability::CountLoadedObjects) {
            let counter = LoadCounter::default();
            pipeline.wrap(Box::new(LoadedObjectsLayer::new(counter.clone())));
            pipeline.track_loaded(counter);
        }
        debug!(mapping = ?self.mapping, layers = ?pipeline.layer_names(), "store assembled");
        Ok(pipeline)
    }
}

/// Fluent builder for [`StoreOptions`].
#[derive(Clone, Debug, Default)]
pub struct StoreOptionsBuilder {
    options: StoreOptions,
}

impl StoreOptionsBuilder {
    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.options.mapping = mapping;
        self
    }

    pub fn long_list(self) -> Self {
        self.mapping(Mapping::LongList)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        if !self.options.capabilities.contains(&capability) {
            self.options.capabilities.push(capability);
        }
        self
    }

    pub fn cache_is_set(self) -> Self {
        self.with(Capability::CacheIsSet)
    }

    pub fn cache_features(self) -> Self {
        self.with(Capability::CacheFeatures)
    }

    pub fn cache_sizes(self) -> Self {
        self.with(Capability::CacheSizes)
    }

    pub fn log(self) -> Self {
        self.with(Capability::Log)
    }

    pub fn count_loaded_objects(self) -> Self {
        self.with(Capability::CountLoadedObjects)
    }

    /// Enable autocommit with [`DEFAULT_AUTOCOMMIT_CHUNK`].
    pub fn autocommit(self) -> Self {
        self.autocommit_chunk(DEFAULT_AUTOCOMMIT_CHUNK)
    }

    pub fn autocommit_chunk(mut self, chunk: usize) -> Self {
        self.options.autocommit = Some(chunk);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.options.cache_capacity = capacity;
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.options.resource = Some(resource.into());
        self
    }

    pub fn build(self) -> StoreResult<StoreOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreValue;
    use ogm_backend::PersistentObject;
    use ogm_types::{ClassInfo, Feature, Id, Value};

    #[test]
    fn defaults_are_bare_direct_write() {
        let options = StoreOptions::default();
        assert_eq!(options.mapping, Mapping::DirectWrite);
        assert!(options.capabilities.is_empty());
        let pipeline = options.open_graph(GraphBackend::in_memory()).unwrap();
        assert!(pipeline.layer_names().is_empty());
    }

    #[test]
    fn layers_follow_fixed_order() {
        let options = StoreOptions::builder()
            .log()
            .count_loaded_objects()
            .cache_sizes()
            .cache_is_set()
            .cache_features()
            .autocommit_chunk(10)
            .build()
            .unwrap();
        let pipeline = options.open_graph(GraphBackend::in_memory()).unwrap();
        assert_eq!(
            pipeline.layer_names(),
            vec![
                "autocommit",
                "is-set-cache",
                "feature-cache",
                "size-cache",
                "logging",
                "loaded-objects"
            ]
        );
        assert_eq!(pipeline.loaded_objects(), Some(0));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(matches!(
            StoreOptions::builder().autocommit_chunk(0).build(),
            Err(StoreError::InvalidOptions(_))
        ));
        assert!(matches!(
            StoreOptions::builder().cache_capacity(0).build(),
            Err(StoreError::InvalidOptions(_))
        ));
    }

    #[test]
    fn builder_deduplicates_capabilities() {
        let options = StoreOptions::builder().log().log().build().unwrap();
        assert_eq!(options.capabilities, vec![Capability::Log]);
    }

    #[test]
    fn options_from_toml() {
        let options = StoreOptions::from_toml_str(
            "mapping = \"long_list\"\ncapabilities = [\"cache_sizes\", \"log\"]\nautocommit = 100\n",
        )
        .unwrap();
        assert_eq!(options.mapping, Mapping::LongList);
        assert!(options.has(Capability::CacheSizes));
        assert_eq!(options.autocommit, Some(100));
        assert_eq!(options.cache_capacity, DEFAULT_CACHE_CAPACITY);

        assert!(StoreOptions::from_toml_str("mapping = \"btree\"\n").is_err());
    }

    #[test]
    fn long_list_needs_graph_backend() {
        let options = StoreOptions::builder().long_list().build().unwrap();
        assert!(matches!(
            options.open_map(KvBackend::in_memory()),
            Err(StoreError::InvalidOptions(_))
        ));
    }

    #[test]
    fn every_configuration_behaves_the_same() {
        let configs = [
            StoreOptions::default(),
            StoreOptions::builder().long_list().build().unwrap(),
            StoreOptions::builder()
                .cache_is_set()
                .cache_features()
                .cache_sizes()
                .log()
                .count_loaded_objects()
                .build()
                .unwrap(),
            StoreOptions::builder()
                .long_list()
                .cache_features()
                .cache_sizes()
                .build()
                .unwrap(),
        ];
        let class = ClassInfo::new("Node", "urn:test");
        let refs = Feature::references("refs");
        let name = Feature::attribute("name");
        for options in configs {
            let mut store = options.open_graph(GraphBackend::in_memory()).unwrap();
            let owner = PersistentObject::new(Id::from_raw("owner"), class.clone());
            let targets: Vec<StoreValue> = ["a", "b", "c"]
                .iter()
                .map(|id| StoreValue::Object(PersistentObject::new(Id::from_raw(*id), class.clone())))
                .collect();

            store.add(&owner, &refs, None, &targets[0]).unwrap();
            store.add(&owner, &refs, None, &targets[1]).unwrap();
            store.add(&owner, &refs, Some(1), &targets[2]).unwrap();
            let expected = vec![targets[0].clone(), targets[2].clone(), targets[1].clone()];
            assert_eq!(store.to_array(&owner, &refs).unwrap(), expected);
            assert_eq!(store.get(&owner, &refs, Some(2)).unwrap(), Some(targets[1].clone()));
            assert_eq!(store.remove(&owner, &refs, 0).unwrap(), targets[0]);
            assert_eq!(store.size(&owner, &refs).unwrap(), 2);
            assert!(!store.contains(&owner, &refs, &targets[0]).unwrap());

            store
                .set(&owner, &name, None, &StoreValue::Attribute(Value::from("n")))
                .unwrap();
            assert!(store.is_set(&owner, &name).unwrap());
            store.close().unwrap();
        }
    }
}
