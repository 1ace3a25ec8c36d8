use std::num::NonZeroUsize;

use lru::LruCache;
use ogm_types::FeatureKey;

use crate::error::StoreResult;
use crate::pipeline::{Request, Response, StoreLayer};
use crate::traits::PersistentStore;

/// Caches `size` answers per feature key.
pub struct SizeCacheLayer {
    cache: LruCache<FeatureKey, usize>,
}

impl SizeCacheLayer {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }
}

impl StoreLayer for SizeCacheLayer {
    fn name(&self) -> &'static str {
        "size-cache"
    }

    fn intercept(&mut self, request: &Request<'_>) -> Option<Response> {
        let Request::Size { .. } = request else {
            return None;
        };
        let key = request.key()?;
        self.cache.get(&key).copied().map(Response::Count)
    }

    fn observe(
        &mut self,
        request: &Request<'_>,
        outcome: &StoreResult<Response>,
        _inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        match (request, outcome) {
            (Request::Size { .. }, Ok(Response::Count(size))) => {
                if let Some(key) = request.key() {
                    self.cache.put(key, *size);
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
