use std::collections::HashMap;
use std::fmt;

use ogm_backend::{GraphBackend, ObjectRef};
use ogm_types::{ClassInfo, Feature, FeatureKey, Id};

use crate::direct::{check_write, require_index, DirectWriteStore};
use crate::error::{StoreError, StoreResult};
use crate::list::{Cursor, NodeList};
use crate::traits::{PersistentStore, StoreValue};

/// Store keeping many-valued references as linked node lists.
///
/// Attributes and single-valued references use the flat encoding of
/// [`DirectWriteStore`]. Each list remembers the last position visited in a
/// [`Cursor`] so sequential positional access walks one step at a time; a
/// list's cursor is dropped whenever its structure changes.
pub struct LongListStore {
    flat: DirectWriteStore,
    cursors: HashMap<FeatureKey, Cursor>,
}

impl LongListStore {
    pub fn new(backend: GraphBackend) -> Self {
        Self::from_direct(DirectWriteStore::new(backend))
    }

    pub fn from_direct(flat: DirectWriteStore) -> Self {
        Self {
            flat,
            cursors: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &GraphBackend {
        self.flat.backend()
    }

    pub fn into_backend(self) -> GraphBackend {
        self.flat.into_backend()
    }

    fn uses_list(feature: &Feature) -> bool {
        feature.is_reference() && feature.is_many()
    }

    fn list(&self, object: &ObjectRef, feature: &Feature) -> StoreResult<Option<NodeList>> {
        Ok(NodeList::open(self.flat.graph()?, object.id(), feature.name()))
    }

    fn list_or_create(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<NodeList> {
        self.flat.backend_mut().get_or_create_node(object)?;
        NodeList::open_or_create(self.flat.graph_mut()?, object.id(), feature.name())
    }

    /// Run `op` with the cursor of `object.feature`, storing it back after.
    fn with_cursor<T>(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        op: impl FnOnce(&mut DirectWriteStore, &mut Option<Cursor>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let key = FeatureKey::of(object.id(), feature);
        let mut cursor = self.cursors.remove(&key);
        let result = op(&mut self.flat, &mut cursor);
        if let Some(cursor) = cursor {
            self.cursors.insert(key, cursor);
        }
        result
    }

    fn forget_cursor(&mut self, object: &ObjectRef, feature: &Feature) {
        self.cursors.remove(&FeatureKey::of(object.id(), feature));
    }

    fn release_all(&mut self, object: &ObjectRef, feature: &Feature, children: Vec<Id>) -> StoreResult<()> {
        for child in children {
            self.flat.release(object.id(), feature, &child)?;
        }
        Ok(())
    }
}

impl PersistentStore for LongListStore {
    fn get(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>) -> StoreResult<Option<StoreValue>> {
        if !Self::uses_list(feature) {
            return self.flat.get(object, feature, index);
        }
        let index = require_index(feature, index)?;
        let Some(list) = self.list(object, feature)? else {
            return Err(StoreError::OutOfRange { index, size: 0 });
        };
        let target = self.with_cursor(object, feature, |flat, cursor| list.get(flat.graph()?, index, cursor))?;
        Ok(Some(StoreValue::Object(self.flat.reify(&target)?)))
    }

    fn set(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
        value: &StoreValue,
    ) -> StoreResult<Option<StoreValue>> {
        if !Self::uses_list(feature) {
            return self.flat.set(object, feature, index, value);
        }
        let index = require_index(feature, index)?;
        let size = self.size(object, feature)?;
        check_write(feature, value, Some(index), size, false)?;
        let list = self.list_or_create(object, feature)?;
        let target = self.flat.target_node(feature, value)?;
        let old = self.with_cursor(object, feature, |flat, cursor| {
            list.replace(flat.graph_mut()?, index, target.id(), cursor)
        })?;
        let previous = self.flat.reify(&old)?;
        if &old != target.id() {
            self.flat.release(object.id(), feature, &old)?;
        }
        self.flat.adopt(object, feature, &target)?;
        Ok(Some(StoreValue::Object(previous)))
    }

    fn is_set(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<bool> {
        if !Self::uses_list(feature) {
            return self.flat.is_set(object, feature);
        }
        Ok(self.size(object, feature)? > 0)
    }

    fn unset(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        if !Self::uses_list(feature) {
            return self.flat.unset(object, feature);
        }
        self.forget_cursor(object, feature);
        let Some(list) = self.list(object, feature)? else {
            return Ok(());
        };
        let removed = list.delete(self.flat.graph_mut()?)?;
        self.release_all(object, feature, removed)
    }

    fn size(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<usize> {
        if !Self::uses_list(feature) {
            return self.flat.size(object, feature);
        }
        match self.list(object, feature)? {
            Some(list) => list.size(self.flat.graph()?),
            None => Ok(0),
        }
    }

    fn contains(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<bool> {
        if !Self::uses_list(feature) {
            return self.flat.contains(object, feature, value);
        }
        let (Some(list), Some(target)) = (self.list(object, feature)?, value.as_object()) else {
            return Ok(false);
        };
        list.contains(self.flat.graph()?, target.id())
    }

    fn index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        if !Self::uses_list(feature) {
            return self.flat.index_of(object, feature, value);
        }
        let (Some(list), Some(target)) = (self.list(object, feature)?, value.as_object()) else {
            return Ok(None);
        };
        list.index_of(self.flat.graph()?, target.id())
    }

    fn last_index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        if !Self::uses_list(feature) {
            return self.flat.last_index_of(object, feature, value);
        }
        let (Some(list), Some(target)) = (self.list(object, feature)?, value.as_object()) else {
            return Ok(None);
        };
        list.last_index_of(self.flat.graph()?, target.id())
    }

    fn add(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>, value: &StoreValue) -> StoreResult<()> {
        if !Self::uses_list(feature) {
            return self.flat.add(object, feature, index, value);
        }
        let size = self.size(object, feature)?;
        check_write(feature, value, index, size, true)?;
        let list = self.list_or_create(object, feature)?;
        let target = self.flat.target_node(feature, value)?;
        self.with_cursor(object, feature, |flat, cursor| {
            list.insert(flat.graph_mut()?, index, target.id(), cursor)
        })?;
        self.flat.adopt(object, feature, &target)
    }

    fn remove(&mut self, object: &ObjectRef, feature: &Feature, index: usize) -> StoreResult<StoreValue> {
        if !Self::uses_list(feature) {
            return self.flat.remove(object, feature, index);
        }
        let Some(list) = self.list(object, feature)? else {
            return Err(StoreError::OutOfRange { index, size: 0 });
        };
        let old = self.with_cursor(object, feature, |flat, cursor| {
            list.remove(flat.graph_mut()?, index, cursor)
        })?;
        let removed = self.flat.reify(&old)?;
        self.flat.release(object.id(), feature, &old)?;
        Ok(StoreValue::Object(removed))
    }

    fn clear(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        if !Self::uses_list(feature) {
            return self.flat.clear(object, feature);
        }
        self.forget_cursor(object, feature);
        let Some(list) = self.list(object, feature)? else {
            return Ok(());
        };
        let removed = list.clear(self.flat.graph_mut()?)?;
        self.release_all(object, feature, removed)
    }

    fn to_array(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<Vec<StoreValue>> {
        if !Self::uses_list(feature) {
            return self.flat.to_array(object, feature);
        }
        let Some(list) = self.list(object, feature)? else {
            return Ok(Vec::new());
        };
        let targets = list.targets(self.flat.graph()?)?;
        targets
            .iter()
            .map(|id| self.flat.reify(id).map(StoreValue::Object))
            .collect()
    }

    fn container(&mut self, object: &ObjectRef) -> StoreResult<Option<ObjectRef>> {
        self.flat.container(object)
    }

    fn containing_feature(&mut self, object: &ObjectRef) -> StoreResult<Option<String>> {
        self.flat.containing_feature(object)
    }

    fn object(&mut self, id: &Id) -> StoreResult<Option<ObjectRef>> {
        self.flat.object(id)
    }

    fn all_instances(&mut self, class: &ClassInfo) -> StoreResult<Vec<ObjectRef>> {
        self.flat.all_instances(class)
    }

    fn save(&mut self) -> StoreResult<()> {
        self.flat.save()
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.flat.commit()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.cursors.clear();
        self.flat.close()
    }
}

impl fmt::Debug for LongListStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongListStore")
            .field("flat", &self.flat)
            .field("cursors", &self.cursors.len())
            .finish()
    }
}
