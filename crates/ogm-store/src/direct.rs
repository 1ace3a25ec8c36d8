use std::fmt;

use tracing::trace;

use ogm_backend::{GraphBackend, ObjectRef, PropertyGraph};
use ogm_types::{ClassInfo, Feature, Id};

use crate::containment::{container_of, is_in_resource, release_child, update_containment};
use crate::error::{StoreError, StoreResult};
use crate::layout;
use crate::traits::{position, PersistentStore, StoreValue};

/// Index of a positional read or replace on a many-valued feature.
pub(crate) fn require_index(feature: &Feature, index: Option<usize>) -> StoreResult<usize> {
    index.ok_or_else(|| StoreError::IndexRequired(feature.name().to_string()))
}

/// Reject a write of `value` at `index` before anything is persisted.
///
/// `size` is the current size of `feature`; `inserting` allows the
/// position one past the end and an absent index.
pub(crate) fn check_write(
    feature: &Feature,
    value: &StoreValue,
    index: Option<usize>,
    size: usize,
    inserting: bool,
) -> StoreResult<()> {
    if feature.is_reference() {
        value.expect_object(feature)?;
    } else {
        value.expect_attribute(feature)?;
    }
    if !feature.is_many() {
        return Ok(());
    }
    match index {
        Some(index) if inserting => layout::check_insert(index, size),
        Some(index) => layout::check_index(index, size),
        None if inserting => Ok(()),
        None => Err(StoreError::IndexRequired(feature.name().to_string())),
    }
}

/// Store writing every operation straight through to a [`GraphBackend`]
/// using the flat encoding of [`layout`].
pub struct DirectWriteStore {
    backend: GraphBackend,
    resource: Option<String>,
}

impl DirectWriteStore {
    pub fn new(backend: GraphBackend) -> Self {
        Self {
            backend,
            resource: None,
        }
    }

    /// Attach reified elements that sit inside a resource to `resource`.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn backend(&self) -> &GraphBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut GraphBackend {
        &mut self.backend
    }

    pub fn into_backend(self) -> GraphBackend {
        self.backend
    }

    pub(crate) fn graph(&self) -> StoreResult<&PropertyGraph> {
        Ok(self.backend.graph()?)
    }

    pub(crate) fn graph_mut(&mut self) -> StoreResult<&mut PropertyGraph> {
        Ok(self.backend.graph_mut()?)
    }

    /// Reify `id`, attaching it to this store's resource when it is
    /// reachable from one.
    pub(crate) fn reify(&mut self, id: &Id) -> StoreResult<ObjectRef> {
        let object = self.backend.reify(id, None)?;
        self.attach_resource(&object)?;
        Ok(object)
    }

    fn attach_resource(&self, object: &ObjectRef) -> StoreResult<()> {
        if let Some(resource) = &self.resource {
            if object.resource().is_none() && is_in_resource(self.graph()?, object.id()) {
                object.set_resource(Some(resource.clone()));
            }
        }
        Ok(())
    }

    fn reify_value(&mut self, id: Option<Id>) -> StoreResult<Option<StoreValue>> {
        id.map(|id| self.reify(&id).map(StoreValue::Object)).transpose()
    }

    /// Node of the object referenced by `value`, created on first use.
    pub(crate) fn target_node(&mut self, feature: &Feature, value: &StoreValue) -> StoreResult<ObjectRef> {
        let target = value.expect_object(feature)?.clone();
        self.backend.get_or_create_node(&target)?;
        Ok(target)
    }

    /// Record `parent.feature` as owner of `child`, if `feature` is a
    /// containment.
    pub(crate) fn adopt(&mut self, parent: &ObjectRef, feature: &Feature, child: &ObjectRef) -> StoreResult<()> {
        if feature.is_containment() {
            update_containment(self.graph_mut()?, feature.name(), parent.id(), child.id())?;
            child.attach(parent, feature.name());
        }
        Ok(())
    }

    /// Drop the ownership `parent.feature` holds over `child`, if any.
    pub(crate) fn release(&mut self, parent: &Id, feature: &Feature, child: &Id) -> StoreResult<()> {
        if !feature.is_containment() {
            return Ok(());
        }
        release_child(self.graph_mut()?, parent, feature.name(), child);
        if let Some(object) = self.backend.cached_object(child) {
            let owned_here = object
                .container()
                .is_some_and(|link| &link.container == parent && link.feature == feature.name());
            if owned_here {
                object.detach();
            }
        }
        Ok(())
    }

    fn attribute_values(&self, id: &Id, feature: &Feature) -> StoreResult<Vec<StoreValue>> {
        let graph = self.graph()?;
        let values = if feature.is_many() {
            layout::attribute_values(graph, id, feature.name())?
        } else {
            graph.property(id, feature.name()).cloned().into_iter().collect()
        };
        Ok(values.into_iter().map(StoreValue::Attribute).collect())
    }

    fn reference_ids(&self, id: &Id, feature: &Feature) -> StoreResult<Vec<Id>> {
        let graph = self.graph()?;
        if feature.is_many() {
            layout::reference_targets(graph, id, feature.name())
        } else {
            Ok(layout::single_reference(graph, id, feature.name()).into_iter().collect())
        }
    }

    fn search(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue, last: bool) -> StoreResult<Option<usize>> {
        match feature {
            Feature::Reference(r) if r.many => {
                let Some(target) = value.as_object() else {
                    return Ok(None);
                };
                let positions = layout::reference_positions(self.graph()?, object.id(), feature.name(), target.id())?;
                let found = if last { positions.last() } else { positions.first() };
                Ok(found.copied())
            }
            Feature::Reference(_) => {
                let current = self.reference_ids(object.id(), feature)?;
                let hit = value.as_object().is_some_and(|t| current.contains(t.id()));
                Ok(hit.then_some(0))
            }
            Feature::Attribute(_) => {
                let values = self.attribute_values(object.id(), feature)?;
                Ok(position(&values, value, last))
            }
        }
    }
}

impl PersistentStore for DirectWriteStore {
    fn get(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>) -> StoreResult<Option<StoreValue>> {
        let id = object.id();
        match feature {
            Feature::Attribute(a) if a.many => {
                let index = require_index(feature, index)?;
                let value = layout::attribute_at(self.graph()?, id, &a.name, index)?;
                Ok(Some(StoreValue::Attribute(value)))
            }
            Feature::Attribute(a) => Ok(self
                .graph()?
                .property(id, &a.name)
                .cloned()
                .map(StoreValue::Attribute)),
            Feature::Reference(r) if r.many => {
                let index = require_index(feature, index)?;
                let target = layout::reference_at(self.graph()?, id, &r.name, index)?;
                self.reify_value(Some(target))
            }
            Feature::Reference(r) => {
                let target = layout::single_reference(self.graph()?, id, &r.name);
                self.reify_value(target)
            }
        }
    }

    fn set(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
        value: &StoreValue,
    ) -> StoreResult<Option<StoreValue>> {
        let size = self.size(object, feature)?;
        check_write(feature, value, index, size, false)?;
        self.backend.get_or_create_node(object)?;
        let id = object.id();
        match feature {
            Feature::Attribute(a) => {
                let v = value.expect_attribute(feature)?.clone();
                let graph = self.graph_mut()?;
                let old = if a.many {
                    let index = require_index(feature, index)?;
                    Some(layout::replace_attribute(graph, id, &a.name, index, v)?)
                } else {
                    graph.set_property(id, &a.name, v)?
                };
                Ok(old.map(StoreValue::Attribute))
            }
            Feature::Reference(r) => {
                let target = self.target_node(feature, value)?;
                let old = if r.many {
                    let index = require_index(feature, index)?;
                    Some(layout::replace_reference(self.graph_mut()?, id, &r.name, index, target.id())?)
                } else {
                    layout::set_single_reference(self.graph_mut()?, id, &r.name, target.id())?
                };
                if let Some(old) = old.as_ref().filter(|o| *o != target.id()) {
                    self.release(id, feature, old)?;
                }
                self.adopt(object, feature, &target)?;
                self.reify_value(old)
            }
        }
    }

    fn is_set(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<bool> {
        let graph = self.graph()?;
        let id = object.id();
        Ok(match feature {
            f if f.is_many() => layout::read_size(graph, id, f.name())?.unwrap_or(0) > 0,
            Feature::Attribute(a) => graph.property(id, &a.name).is_some(),
            Feature::Reference(r) => layout::single_reference(graph, id, &r.name).is_some(),
        })
    }

    fn unset(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        let id = object.id();
        if !self.backend.node_for(id)? {
            return Ok(());
        }
        match feature {
            Feature::Attribute(a) if a.many => layout::clear_attributes(self.graph_mut()?, id, &a.name, false)?,
            Feature::Attribute(a) => {
                self.graph_mut()?.remove_property(id, &a.name);
            }
            Feature::Reference(r) => {
                let removed = layout::clear_references(self.graph_mut()?, id, &r.name, false)?;
                for child in removed {
                    self.release(id, feature, &child)?;
                }
            }
        }
        trace!(id = %id, feature = feature.name(), "unset");
        Ok(())
    }

    fn size(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<usize> {
        let graph = self.graph()?;
        let id = object.id();
        Ok(match feature {
            f if f.is_many() => layout::read_size(graph, id, f.name())?.unwrap_or(0),
            Feature::Attribute(a) => usize::from(graph.property(id, &a.name).is_some()),
            Feature::Reference(r) => usize::from(layout::single_reference(graph, id, &r.name).is_some()),
        })
    }

    fn contains(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<bool> {
        Ok(self.search(object, feature, value, false)?.is_some())
    }

    fn index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        self.search(object, feature, value, false)
    }

    fn last_index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        self.search(object, feature, value, true)
    }

    fn add(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>, value: &StoreValue) -> StoreResult<()> {
        if !feature.is_many() {
            if let Some(i) = index.filter(|i| *i > 0) {
                return Err(StoreError::OutOfRange { index: i, size: 1 });
            }
            self.set(object, feature, None, value)?;
            return Ok(());
        }
        let size = self.size(object, feature)?;
        check_write(feature, value, index, size, true)?;
        self.backend.get_or_create_node(object)?;
        let id = object.id();
        match feature {
            Feature::Attribute(a) => {
                let v = value.expect_attribute(feature)?.clone();
                layout::insert_attribute(self.graph_mut()?, id, &a.name, index, v)?;
            }
            Feature::Reference(r) => {
                let target = self.target_node(feature, value)?;
                layout::insert_reference(self.graph_mut()?, id, &r.name, index, target.id())?;
                self.adopt(object, feature, &target)?;
            }
        }
        Ok(())
    }

    fn remove(&mut self, object: &ObjectRef, feature: &Feature, index: usize) -> StoreResult<StoreValue> {
        let id = object.id();
        if !feature.is_many() {
            let size = self.size(object, feature)?;
            if index >= size {
                return Err(StoreError::OutOfRange { index, size });
            }
            let old = self.get(object, feature, None)?;
            self.unset(object, feature)?;
            return old.ok_or_else(|| StoreError::inconsistent(id, "value vanished during removal"));
        }
        match feature {
            Feature::Attribute(a) => {
                let old = layout::remove_attribute(self.graph_mut()?, id, &a.name, index)?;
                Ok(StoreValue::Attribute(old))
            }
            Feature::Reference(r) => {
                let old = layout::remove_reference(self.graph_mut()?, id, &r.name, index)?;
                let removed = self.reify(&old)?;
                self.release(id, feature, &old)?;
                Ok(StoreValue::Object(removed))
            }
        }
    }

    fn clear(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        let id = object.id();
        if !feature.is_many() {
            return self.unset(object, feature);
        }
        if !self.backend.node_for(id)? {
            return Ok(());
        }
        match feature {
            Feature::Attribute(a) => layout::clear_attributes(self.graph_mut()?, id, &a.name, true)?,
            Feature::Reference(r) => {
                let removed = layout::clear_references(self.graph_mut()?, id, &r.name, true)?;
                for child in removed {
                    self.release(id, feature, &child)?;
                }
            }
        }
        Ok(())
    }

    fn to_array(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<Vec<StoreValue>> {
        match feature {
            Feature::Attribute(_) => self.attribute_values(object.id(), feature),
            Feature::Reference(_) => {
                let ids = self.reference_ids(object.id(), feature)?;
                ids.iter()
                    .map(|id| self.reify(id).map(StoreValue::Object))
                    .collect()
            }
        }
    }

    fn container(&mut self, object: &ObjectRef) -> StoreResult<Option<ObjectRef>> {
        let parent = container_of(self.graph()?, object.id()).map(|(p, _)| p);
        parent.map(|p| self.reify(&p)).transpose()
    }

    fn containing_feature(&mut self, object: &ObjectRef) -> StoreResult<Option<String>> {
        Ok(container_of(self.graph()?, object.id()).and_then(|(_, f)| f))
    }

    fn object(&mut self, id: &Id) -> StoreResult<Option<ObjectRef>> {
        if !self.backend.node_for(id)? {
            return Ok(None);
        }
        self.reify(id).map(Some)
    }

    fn all_instances(&mut self, class: &ClassInfo) -> StoreResult<Vec<ObjectRef>> {
        let objects = self.backend.all_instances(class)?;
        for object in &objects {
            self.attach_resource(object)?;
        }
        Ok(objects)
    }

    fn save(&mut self) -> StoreResult<()> {
        Ok(self.backend.save()?)
    }

    fn commit(&mut self) -> StoreResult<()> {
        Ok(self.backend.commit()?)
    }

    fn close(&mut self) -> StoreResult<()> {
        Ok(self.backend.close()?)
    }
}

impl fmt::Debug for DirectWriteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectWriteStore")
            .field("backend", &self.backend)
            .field("resource", &self.resource)
            .finish()
    }
}
