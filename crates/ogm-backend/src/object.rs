use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ogm_types::{ClassInfo, Id};

/// Shared handle to a live model element.
///
/// Reification hands out clones of the same `Arc`, so two handles for one
/// id compare equal with [`Arc::ptr_eq`] while the object is cached.
pub type ObjectRef = Arc<PersistentObject>;

/// Where an element sits in the containment tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerLink {
    pub container: Id,
    pub feature: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ObjectState {
    resource: Option<String>,
    container: Option<ContainerLink>,
}

/// The in-memory side of a model element.
///
/// Identity and class never change. The mapping flag and the containment
/// state are interior-mutable so every holder of the shared handle sees the
/// same view.
pub struct PersistentObject {
    id: Id,
    class: ClassInfo,
    mapped: AtomicBool,
    state: Mutex<ObjectState>,
}

impl PersistentObject {
    /// A fresh, unmapped object.
    pub fn new(id: Id, class: ClassInfo) -> ObjectRef {
        Arc::new(Self {
            id,
            class,
            mapped: AtomicBool::new(false),
            state: Mutex::new(ObjectState::default()),
        })
    }

    /// A fresh object with a generated id.
    pub fn create(class: ClassInfo) -> ObjectRef {
        Self::new(Id::generate(), class)
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn class(&self) -> &ClassInfo {
        &self.class
    }

    /// Whether a backend node has been created for this object.
    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    pub fn set_mapped(&self, mapped: bool) {
        self.mapped.store(mapped, Ordering::Release);
    }

    pub fn resource(&self) -> Option<String> {
        self.state.lock().resource.clone()
    }

    pub fn set_resource(&self, resource: Option<String>) {
        self.state.lock().resource = resource;
    }

    pub fn container(&self) -> Option<ContainerLink> {
        self.state.lock().container.clone()
    }

    /// Record `container.feature` as this object's owner and adopt the
    /// owner's resource.
    pub fn attach(&self, container: &PersistentObject, feature: &str) {
        let resource = container.resource();
        let mut state = self.state.lock();
        state.container = Some(ContainerLink {
            container: container.id.clone(),
            feature: feature.to_string(),
        });
        if resource.is_some() {
            state.resource = resource;
        }
    }

    /// Forget the owner and the resource.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.container = None;
        state.resource = None;
    }
}

impl fmt::Debug for PersistentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentObject")
            .field("id", &self.id)
            .field("class", &self.class.name)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class() -> ClassInfo {
        ClassInfo::new("Node", "urn:test")
    }

    #[test]
    fn new_objects_are_unmapped() {
        let o = PersistentObject::new(Id::from_raw("a"), class());
        assert!(!o.is_mapped());
        o.set_mapped(true);
        assert!(o.is_mapped());
    }

    #[test]
    fn attach_adopts_container_resource() {
        let parent = PersistentObject::new(Id::from_raw("p"), class());
        parent.set_resource(Some("model.ogm".into()));
        let child = PersistentObject::new(Id::from_raw("c"), class());

        child.attach(&parent, "children");
        assert_eq!(
            child.container(),
            Some(ContainerLink {
                container: Id::from_raw("p"),
                feature: "children".into()
            })
        );
        assert_eq!(child.resource().as_deref(), Some("model.ogm"));

        child.detach();
        assert!(child.container().is_none());
        assert!(child.resource().is_none());
    }

    #[test]
    fn clones_share_state() {
        let a = PersistentObject::create(class());
        let b = Arc::clone(&a);
        a.set_resource(Some("r".into()));
        assert_eq!(b.resource().as_deref(), Some("r"));
    }
}
