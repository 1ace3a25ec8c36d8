use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use ogm_types::FeatureKey;

use crate::error::StoreResult;
use crate::pipeline::{Request, Response, StoreLayer};
use crate::traits::{PersistentStore, StoreValue};

/// Caches `get` answers per feature key and index.
///
/// Single-valued features are cached under index 0. Any mutation of a
/// feature drops every cached position for it, since inserts and removals
/// shift later indexes.
pub struct FeatureCacheLayer {
    cache: LruCache<FeatureKey, HashMap<usize, Option<StoreValue>>>,
}

impl FeatureCacheLayer {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }
}

impl StoreLayer for FeatureCacheLayer {
    fn name(&self) -> &'static str {
        "feature-cache"
    }

    fn intercept(&mut self, request: &Request<'_>) -> Option<Response> {
        let Request::Get { index, .. } = *request else {
            return None;
        };
        let key = request.key()?;
        self.cache
            .get(&key)
            .and_then(|slots| slots.get(&index.unwrap_or(0)))
            .cloned()
            .map(Response::Value)
    }

    fn observe(
        &mut self,
        request: &Request<'_>,
        outcome: &StoreResult<Response>,
        _inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        match (request, outcome) {
            (Request::Get { index, .. }, Ok(Response::Value(value))) => {
                if let Some(key) = request.key() {
                    let slot = index.unwrap_or(0);
                    match self.cache.get_mut(&key) {
                        Some(slots) => {
                            slots.insert(slot, value.clone());
                        }
                        None => {
                            self.cache.put(key, HashMap::from([(slot, value.clone())]));
                        }
                    }
                }
            }
            (Request::Close, _) => self.cache.clear(),
            _ if request.is_mutation() => {
                if let Some(key) = request.key() {
                    self.cache.pop(&key);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectWriteStore;
    use crate::pipeline::StorePipeline;
    use ogm_backend::{GraphBackend, PersistentObject};
    use ogm_types::{ClassInfo, Feature, Id, Value};

    fn text(s: &str) -> StoreValue {
        StoreValue::Attribute(Value::from(s))
    }

    #[test]
    fn positions_are_refreshed_after_insert() {
        let mut p = StorePipeline::new(Box::new(DirectWriteStore::new(GraphBackend::in_memory())));
        p.wrap(Box::new(FeatureCacheLayer::new(16)));
        let o = PersistentObject::new(Id::from_raw("e"), ClassInfo::new("N", "urn:t"));
        let f = Feature::attributes("tags");

        p.add(&o, &f, None, &text("b")).unwrap();
        assert_eq!(p.get(&o, &f, Some(0)).unwrap(), Some(text("b")));
        p.add(&o, &f, Some(0), &text("a")).unwrap();
        assert_eq!(p.get(&o, &f, Some(0)).unwrap(), Some(text("a")));
        assert_eq!(p.get(&o, &f, Some(1)).unwrap(), Some(text("b")));
    }

    #[test]
    fn single_value_cached_until_set() {
        let mut p = StorePipeline::new(Box::new(DirectWriteStore::new(GraphBackend::in_memory())));
        p.wrap(Box::new(FeatureCacheLayer::new(16)));
        let o = PersistentObject::new(Id::from_raw("e"), ClassInfo::new("N", "urn:t"));
        let f = Feature::attribute("name");

        assert_eq!(p.get(&o, &f, None).unwrap(), None);
        p.set(&o, &f, None, &text("x")).unwrap();
        assert_eq!(p.get(&o, &f, None).unwrap(), Some(text("x")));
    }
}
