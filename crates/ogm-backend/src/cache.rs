use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::trace;

use ogm_types::{ClassInfo, Id};

use crate::error::{BackendError, BackendResult};
use crate::object::{ObjectRef, PersistentObject};

/// Default capacity of the node and object caches.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

/// Bounded identifier → object cache.
///
/// While an id is cached, every reification returns the same handle.
/// Entries may be evicted at any time, after which a new handle is built.
pub struct ReificationCache {
    objects: LruCache<Id, ObjectRef>,
}

impl ReificationCache {
    pub fn new(capacity_hint: usize) -> Self {
        Self {
            objects: LruCache::new(capacity(capacity_hint)),
        }
    }

    pub fn get(&mut self, id: &Id) -> Option<ObjectRef> {
        self.objects.get(id).cloned()
    }

    /// Cache `object`, replacing any handle previously held for its id.
    pub fn insert(&mut self, object: &ObjectRef) {
        self.objects.put(object.id().clone(), Arc::clone(object));
    }

    pub fn invalidate(&mut self, id: &Id) {
        self.objects.pop(id);
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Return the cached handle for `id`, or build one from `class` and
    /// cache it.
    ///
    /// Built objects are marked mapped since they come from storage.
    pub fn reify(&mut self, id: &Id, class: Option<ClassInfo>) -> BackendResult<ObjectRef> {
        if let Some(cached) = self.get(id) {
            return Ok(cached);
        }
        let class = class.ok_or_else(|| BackendError::MissingClassInfo(id.clone()))?;
        let object = PersistentObject::new(id.clone(), class);
        object.set_mapped(true);
        self.insert(&object);
        trace!(id = %id, "reified");
        Ok(object)
    }
}

impl Default for ReificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Bounded cache of node-existence lookups.
pub struct NodeCache {
    known: LruCache<Id, bool>,
}

impl NodeCache {
    pub fn new(capacity_hint: usize) -> Self {
        Self {
            known: LruCache::new(capacity(capacity_hint)),
        }
    }

    /// Cached answer, if any.
    pub fn get(&mut self, id: &Id) -> Option<bool> {
        self.known.get(id).copied()
    }

    pub fn put(&mut self, id: &Id, exists: bool) {
        self.known.put(id.clone(), exists);
    }

    pub fn invalidate(&mut self, id: &Id) {
        self.known.pop(id);
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class() -> ClassInfo {
        ClassInfo::new("Node", "urn:test")
    }

    #[test]
    fn reify_returns_same_handle_while_cached() {
        let mut cache = ReificationCache::new(4);
        let a = cache.reify(&Id::from_raw("a"), Some(class())).unwrap();
        let b = cache.reify(&Id::from_raw("a"), None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_mapped());
    }

    #[test]
    fn reify_without_class_fails() {
        let mut cache = ReificationCache::new(4);
        let err = cache.reify(&Id::from_raw("x"), None).unwrap_err();
        assert!(matches!(err, BackendError::MissingClassInfo(_)));
    }

    #[test]
    fn eviction_builds_a_new_handle() {
        let mut cache = ReificationCache::new(1);
        let a = cache.reify(&Id::from_raw("a"), Some(class())).unwrap();
        cache.reify(&Id::from_raw("b"), Some(class())).unwrap();
        let a2 = cache.reify(&Id::from_raw("a"), Some(class())).unwrap();
        assert!(!Arc::ptr_eq(&a, &a2));
        assert_eq!(a.id(), a2.id());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = NodeCache::new(0);
        cache.put(&Id::from_raw("a"), true);
        assert_eq!(cache.get(&Id::from_raw("a")), Some(true));
    }
}
