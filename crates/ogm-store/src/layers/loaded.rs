use std::collections::HashSet;
use std::sync::Arc;

use ogm_types::Id;
use parking_lot::Mutex;

use crate::error::StoreResult;
use crate::pipeline::{Request, Response, StoreLayer};
use crate::traits::PersistentStore;

/// Shared count of the distinct objects a pipeline has handed out.
#[derive(Clone, Debug, Default)]
pub struct LoadCounter {
    seen: Arc<Mutex<HashSet<Id>>>,
}

impl LoadCounter {
    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    fn record(&self, id: &Id) {
        self.seen.lock().insert(id.clone());
    }
}

/// Counts every distinct object that appears in a successful response.
pub struct LoadedObjectsLayer {
    counter: LoadCounter,
}

impl LoadedObjectsLayer {
    pub fn new(counter: LoadCounter) -> Self {
        Self { counter }
    }
}

impl StoreLayer for LoadedObjectsLayer {
    fn name(&self) -> &'static str {
        "loaded-objects"
    }

    fn observe(
        &mut self,
        _request: &Request<'_>,
        outcome: &StoreResult<Response>,
        _inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        if let Ok(response) = outcome {
            for object in response.objects() {
                self.counter.record(object.id());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectWriteStore;
    use crate::pipeline::StorePipeline;
    use crate::traits::StoreValue;
    use ogm_backend::{GraphBackend, PersistentObject};
    use ogm_types::{ClassInfo, Feature};

    #[test]
    fn counts_distinct_objects() {
        let counter = LoadCounter::default();
        let mut p = StorePipeline::new(Box::new(DirectWriteStore::new(GraphBackend::in_memory())));
        p.wrap(Box::new(LoadedObjectsLayer::new(counter.clone())));
        p.track_loaded(counter);

        let class = ClassInfo::new("N", "urn:t");
        let parent = PersistentObject::new(Id::from_raw("p"), class.clone());
        let f = Feature::references("refs");
        for id in ["a", "b"] {
            let target = PersistentObject::new(Id::from_raw(id), class.clone());
            p.add(&parent, &f, None, &StoreValue::Object(target)).unwrap();
        }
        assert_eq!(p.loaded_objects(), Some(0));

        p.to_array(&parent, &f).unwrap();
        p.get(&parent, &f, Some(0)).unwrap();
        assert_eq!(p.loaded_objects(), Some(2));
    }
}
