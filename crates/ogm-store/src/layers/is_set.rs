use std::num::NonZeroUsize;

use lru::LruCache;
use ogm_types::FeatureKey;

use crate::error::StoreResult;
use crate::pipeline::{Request, Response, StoreLayer};
use crate::traits::PersistentStore;

/// Caches `is_set` answers per feature key.
pub struct IsSetCacheLayer {
    cache: LruCache<FeatureKey, bool>,
}

impl IsSetCacheLayer {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }
}

impl StoreLayer for IsSetCacheLayer {
    fn name(&self) -> &'static str {
        "is-set-cache"
    }

    fn intercept(&mut self, request: &Request<'_>) -> Option<Response> {
        let Request::IsSet { .. } = request else {
            return None;
        };
        let key = request.key()?;
        self.cache.get(&key).copied().map(Response::Flag)
    }

    fn observe(
        &mut self,
        request: &Request<'_>,
        outcome: &StoreResult<Response>,
        _inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        match (request, outcome) {
            (Request::IsSet { .. }, Ok(Response::Flag(set))) => {
                if let Some(key) = request.key() {
                    self.cache.put(key, *set);
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
