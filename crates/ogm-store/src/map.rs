use std::fmt;

use ogm_backend::{ContainerRecord, KvBackend, KvValue, ObjectRef};
use ogm_types::{ClassInfo, Feature, FeatureKey, Id, Value};

use crate::direct::{check_write, require_index};
use crate::error::{StoreError, StoreResult};
use crate::traits::{position, PersistentStore, StoreValue};

/// One stored entry of a feature, before reification.
#[derive(Clone, Debug, PartialEq)]
enum Item {
    Value(Value),
    Ref(Id),
}

/// Store over a [`KvBackend`]: each `(element, feature)` pair maps to one
/// value or one ordered list.
pub struct MapStore {
    backend: KvBackend,
    resource: Option<String>,
}

impl MapStore {
    pub fn new(backend: KvBackend) -> Self {
        Self {
            backend,
            resource: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn backend(&self) -> &KvBackend {
        &self.backend
    }

    fn reify(&mut self, id: &Id) -> StoreResult<ObjectRef> {
        let object = self.backend.reify(id, None)?;
        if let Some(resource) = &self.resource {
            if object.resource().is_none() && self.backend.container(id)?.is_some() {
                object.set_resource(Some(resource.clone()));
            }
        }
        Ok(object)
    }

    fn items(&self, key: &FeatureKey) -> StoreResult<Vec<Item>> {
        Ok(match self.backend.value(key)? {
            None => Vec::new(),
            Some(KvValue::Attribute(v)) => vec![Item::Value(v.clone())],
            Some(KvValue::Attributes(vs)) => vs.iter().cloned().map(Item::Value).collect(),
            Some(KvValue::Reference(id)) => vec![Item::Ref(id.clone())],
            Some(KvValue::References(ids)) => ids.iter().cloned().map(Item::Ref).collect(),
        })
    }

    fn store_items(&mut self, key: FeatureKey, feature: &Feature, items: Vec<Item>) -> StoreResult<()> {
        let value = match feature {
            Feature::Attribute(a) if a.many => KvValue::Attributes(
                items
                    .into_iter()
                    .map(|i| match i {
                        Item::Value(v) => Ok(v),
                        Item::Ref(_) => Err(mixed(feature)),
                    })
                    .collect::<StoreResult<_>>()?,
            ),
            Feature::Reference(r) if r.many => KvValue::References(
                items
                    .into_iter()
                    .map(|i| match i {
                        Item::Ref(id) => Ok(id),
                        Item::Value(_) => Err(mixed(feature)),
                    })
                    .collect::<StoreResult<_>>()?,
            ),
            _ => match items.into_iter().next() {
                None => {
                    self.backend.remove_value(&key)?;
                    return Ok(());
                }
                Some(Item::Value(v)) => KvValue::Attribute(v),
                Some(Item::Ref(id)) => KvValue::Reference(id),
            },
        };
        self.backend.put_value(key, value)?;
        Ok(())
    }

    /// Convert an incoming value, registering referenced objects.
    fn item(&mut self, feature: &Feature, value: &StoreValue) -> StoreResult<Item> {
        match feature {
            Feature::Attribute(_) => Ok(Item::Value(value.expect_attribute(feature)?.clone())),
            Feature::Reference(_) => {
                let target = value.expect_object(feature)?;
                self.backend.register(target)?;
                Ok(Item::Ref(target.id().clone()))
            }
        }
    }

    fn materialize(&mut self, item: Item) -> StoreResult<StoreValue> {
        match item {
            Item::Value(v) => Ok(StoreValue::Attribute(v)),
            Item::Ref(id) => Ok(StoreValue::Object(self.reify(&id)?)),
        }
    }

    fn adopt(&mut self, parent: &ObjectRef, feature: &Feature, child: &ObjectRef) -> StoreResult<()> {
        if feature.is_containment() {
            self.backend.put_container(
                child.id().clone(),
                ContainerRecord {
                    container: parent.id().clone(),
                    feature: feature.name().to_string(),
                },
            )?;
            child.attach(parent, feature.name());
        }
        Ok(())
    }

    fn release(&mut self, parent: &Id, feature: &Feature, item: &Item) -> StoreResult<()> {
        let (true, Item::Ref(child)) = (feature.is_containment(), item) else {
            return Ok(());
        };
        let owned_here = self
            .backend
            .container(child)?
            .is_some_and(|c| &c.container == parent && c.feature == feature.name());
        if owned_here {
            self.backend.remove_container(child)?;
            if let Some(object) = self.backend.cached_object(child) {
                object.detach();
            }
        }
        Ok(())
    }
}

fn mixed(feature: &Feature) -> StoreError {
    StoreError::InvalidValue {
        feature: feature.name().to_string(),
        reason: "attribute and reference values mixed in one feature".into(),
    }
}

fn check_index(index: usize, size: usize) -> StoreResult<()> {
    if index >= size {
        return Err(StoreError::OutOfRange { index, size });
    }
    Ok(())
}

impl PersistentStore for MapStore {
    fn get(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>) -> StoreResult<Option<StoreValue>> {
        let mut items = self.items(&FeatureKey::of(object.id(), feature))?;
        if !feature.is_many() {
            return items.pop().map(|i| self.materialize(i)).transpose();
        }
        let index = require_index(feature, index)?;
        check_index(index, items.len())?;
        self.materialize(items.swap_remove(index)).map(Some)
    }

    fn set(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
        value: &StoreValue,
    ) -> StoreResult<Option<StoreValue>> {
        let key = FeatureKey::of(object.id(), feature);
        let mut items = self.items(&key)?;
        check_write(feature, value, index, items.len(), false)?;
        self.backend.register(object)?;
        let item = self.item(feature, value)?;
        let old = if feature.is_many() {
            let index = require_index(feature, index)?;
            Some(std::mem::replace(&mut items[index], item.clone()))
        } else {
            let old = items.pop();
            items = vec![item.clone()];
            old
        };
        self.store_items(key, feature, items)?;

        if let Some(old) = old.as_ref().filter(|o| **o != item) {
            self.release(object.id(), feature, old)?;
        }
        if let StoreValue::Object(child) = value {
            self.adopt(object, feature, child)?;
        }
        old.map(|o| self.materialize(o)).transpose()
    }

    fn is_set(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<bool> {
        Ok(!self.items(&FeatureKey::of(object.id(), feature))?.is_empty())
    }

    fn unset(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        let key = FeatureKey::of(object.id(), feature);
        let removed = self.items(&key)?;
        self.backend.remove_value(&key)?;
        for item in &removed {
            self.release(object.id(), feature, item)?;
        }
        Ok(())
    }

    fn size(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<usize> {
        Ok(self.items(&FeatureKey::of(object.id(), feature))?.len())
    }

    fn contains(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<bool> {
        Ok(self.index_of(object, feature, value)?.is_some())
    }

    fn index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        let values = self.to_array(object, feature)?;
        Ok(position(&values, value, false))
    }

    fn last_index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        let values = self.to_array(object, feature)?;
        Ok(position(&values, value, true))
    }

    fn add(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>, value: &StoreValue) -> StoreResult<()> {
        if !feature.is_many() {
            if let Some(i) = index.filter(|i| *i > 0) {
                return Err(StoreError::OutOfRange { index: i, size: 1 });
            }
            self.set(object, feature, None, value)?;
            return Ok(());
        }
        let key = FeatureKey::of(object.id(), feature);
        let mut items = self.items(&key)?;
        check_write(feature, value, index, items.len(), true)?;
        self.backend.register(object)?;
        let index = index.unwrap_or(items.len());
        let item = self.item(feature, value)?;
        items.insert(index, item);
        self.store_items(key, feature, items)?;
        if let StoreValue::Object(child) = value {
            self.adopt(object, feature, child)?;
        }
        Ok(())
    }

    fn remove(&mut self, object: &ObjectRef, feature: &Feature, index: usize) -> StoreResult<StoreValue> {
        let key = FeatureKey::of(object.id(), feature);
        let mut items = self.items(&key)?;
        check_index(index, items.len())?;
        let removed = items.remove(index);
        self.store_items(key, feature, items)?;
        let value = self.materialize(removed.clone())?;
        self.release(object.id(), feature, &removed)?;
        Ok(value)
    }

    fn clear(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        if !feature.is_many() {
            return self.unset(object, feature);
        }
        let key = FeatureKey::of(object.id(), feature);
        let removed = self.items(&key)?;
        if removed.is_empty() {
            return Ok(());
        }
        self.store_items(key, feature, Vec::new())?;
        for item in &removed {
            self.release(object.id(), feature, item)?;
        }
        Ok(())
    }

    fn to_array(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<Vec<StoreValue>> {
        let items = self.items(&FeatureKey::of(object.id(), feature))?;
        items.into_iter().map(|i| self.materialize(i)).collect()
    }

    fn container(&mut self, object: &ObjectRef) -> StoreResult<Option<ObjectRef>> {
        let parent = self.backend.container(object.id())?.map(|c| c.container.clone());
        parent.map(|p| self.reify(&p)).transpose()
    }

    fn containing_feature(&mut self, object: &ObjectRef) -> StoreResult<Option<String>> {
        Ok(self.backend.container(object.id())?.map(|c| c.feature.clone()))
    }

    fn object(&mut self, id: &Id) -> StoreResult<Option<ObjectRef>> {
        if !self.backend.contains_element(id)? {
            return Ok(None);
        }
        self.reify(id).map(Some)
    }

    fn all_instances(&mut self, class: &ClassInfo) -> StoreResult<Vec<ObjectRef>> {
        Ok(self.backend.all_instances(class)?)
    }

    fn save(&mut self) -> StoreResult<()> {
        Ok(self.backend.save()?)
    }

    fn commit(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        Ok(self.backend.close()?)
    }
}

impl fmt::Debug for MapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStore")
            .field("backend", &self.backend)
            .field("resource", &self.resource)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use ogm_backend::{BackendConfig, PersistentObject};

    fn object(id: &str) -> ObjectRef {
        PersistentObject::new(Id::from_raw(id), ClassInfo::new("Node", "urn:test"))
    }

    fn text(s: &str) -> StoreValue {
        StoreValue::Attribute(Value::from(s))
    }

    fn store() -> MapStore {
        MapStore::new(KvBackend::in_memory())
    }

    #[test]
    fn single_attribute_lifecycle() {
        let mut s = store();
        let o = object("e");
        let name = Feature::attribute("name");
        assert_eq!(s.set(&o, &name, None, &text("a")).unwrap(), None);
        assert_eq!(s.set(&o, &name, None, &text("b")).unwrap(), Some(text("a")));
        assert_eq!(s.get(&o, &name, None).unwrap(), Some(text("b")));
        s.unset(&o, &name).unwrap();
        assert!(!s.is_set(&o, &name).unwrap());
    }

    #[test]
    fn many_attribute_insert_and_remove() {
        let mut s = store();
        let o = object("e");
        let tags = Feature::attributes("tags");
        for t in ["a", "c"] {
            s.add(&o, &tags, None, &text(t)).unwrap();
        }
        s.add(&o, &tags, Some(1), &text("b")).unwrap();
        assert_eq!(s.to_array(&o, &tags).unwrap(), vec![text("a"), text("b"), text("c")]);
        assert_eq!(s.remove(&o, &tags, 1).unwrap(), text("b"));
        assert!(matches!(
            s.get(&o, &tags, Some(2)),
            Err(StoreError::OutOfRange { index: 2, size: 2 })
        ));
    }

    #[test]
    fn rejected_writes_register_nothing() {
        let mut s = store();
        let o = object("e");
        let x = object("x");
        let children = Feature::containment("children", true);
        let child = StoreValue::Object(x.clone());

        assert!(matches!(
            s.set(&o, &children, Some(0), &child),
            Err(StoreError::OutOfRange { index: 0, size: 0 })
        ));
        assert!(matches!(
            s.add(&o, &children, Some(1), &child),
            Err(StoreError::OutOfRange { index: 1, size: 0 })
        ));
        assert!(matches!(
            s.add(&o, &Feature::attributes("tags"), None, &child),
            Err(StoreError::InvalidValue { .. })
        ));
        assert_eq!(s.backend().element_count(), 0);
        assert!(!o.is_mapped());
        assert!(!x.is_mapped());
    }

    #[test]
    fn references_keep_identity_and_order() {
        let mut s = store();
        let owner = object("o");
        let refs = Feature::references("refs");
        let (a, b) = (object("a"), object("b"));
        s.add(&owner, &refs, None, &StoreValue::Object(a.clone())).unwrap();
        s.add(&owner, &refs, None, &StoreValue::Object(b.clone())).unwrap();
        let first = s.get(&owner, &refs, Some(0)).unwrap().unwrap();
        assert!(Arc::ptr_eq(first.as_object().unwrap(), &a));
        assert_eq!(s.last_index_of(&owner, &refs, &StoreValue::Object(b)).unwrap(), Some(1));
    }

    #[test]
    fn containment_single_owner() {
        let mut s = store();
        let children = Feature::containment("children", true);
        let (p, q, k) = (object("P"), object("Q"), object("K"));
        s.add(&p, &children, None, &StoreValue::Object(k.clone())).unwrap();
        s.add(&q, &children, None, &StoreValue::Object(k.clone())).unwrap();
        assert_eq!(s.container(&k).unwrap().unwrap().id(), q.id());
        assert_eq!(s.containing_feature(&k).unwrap().as_deref(), Some("children"));

        // removing from the former owner must not detach the child
        s.remove(&p, &children, 0).unwrap();
        assert_eq!(s.container(&k).unwrap().unwrap().id(), q.id());

        s.clear(&q, &children).unwrap();
        assert!(s.container(&k).unwrap().is_none());
        assert!(k.container().is_none());
    }

    #[test]
    fn clear_keeps_feature_empty() {
        let mut s = store();
        let o = object("e");
        let tags = Feature::attributes("tags");
        s.add(&o, &tags, None, &text("x")).unwrap();
        s.clear(&o, &tags).unwrap();
        assert_eq!(s.size(&o, &tags).unwrap(), 0);
        assert!(!s.is_set(&o, &tags).unwrap());
    }

    #[test]
    fn durable_map_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::at(dir.path());
        let o = object("e");
        let name = Feature::attribute("name");
        {
            let mut s = MapStore::new(KvBackend::open(&config).unwrap());
            s.set(&o, &name, None, &text("kept")).unwrap();
            s.close().unwrap();
        }
        let mut s = MapStore::new(KvBackend::open(&config).unwrap());
        let found = s.object(o.id()).unwrap().unwrap();
        assert_eq!(s.get(&found, &name, None).unwrap(), Some(text("kept")));
        assert_eq!(s.all_instances(o.class()).unwrap().len(), 1);
    }
}
