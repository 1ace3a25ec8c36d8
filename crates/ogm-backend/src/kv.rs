use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use ogm_types::{ClassInfo, FeatureKey, Id, Value};

use crate::cache::ReificationCache;
use crate::config::{claim_directory, BackendConfig, BackendKind};
use crate::error::{BackendError, BackendResult};
use crate::object::ObjectRef;
use crate::snapshot::{read_snapshot, write_snapshot};

/// File name of the key-value snapshot inside a storage directory.
pub const KV_SNAPSHOT: &str = "map.snap";

/// Value stored for one [`FeatureKey`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KvValue {
    Attribute(Value),
    Attributes(Vec<Value>),
    Reference(Id),
    References(Vec<Id>),
}

/// Owner of an element, as recorded by the key-value backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub container: Id,
    pub feature: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KvData {
    features: HashMap<FeatureKey, KvValue>,
    containers: HashMap<Id, ContainerRecord>,
    instances: HashMap<Id, ClassInfo>,
}

/// Key-value backend: three maps (feature values, containers, classes)
/// persisted together as one snapshot.
pub struct KvBackend {
    data: KvData,
    path: Option<PathBuf>,
    objects: ReificationCache,
    closed: bool,
}

impl KvBackend {
    pub fn open(config: &BackendConfig) -> BackendResult<Self> {
        let (data, path) = match &config.path {
            None => (KvData::default(), None),
            Some(dir) => {
                claim_directory(dir, BackendKind::Map)?;
                let path = dir.join(KV_SNAPSHOT);
                (read_snapshot(&path)?.unwrap_or_default(), Some(path))
            }
        };
        info!(
            durable = path.is_some(),
            elements = data.instances.len(),
            "map backend opened"
        );
        Ok(Self {
            data,
            path,
            objects: ReificationCache::new(config.object_cache_capacity),
            closed: false,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            data: KvData::default(),
            path: None,
            objects: ReificationCache::default(),
            closed: false,
        }
    }

    fn check_open(&self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::InvalidStore("backend is closed".into()));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Feature values
    // -----------------------------------------------------------------------

    pub fn value(&self, key: &FeatureKey) -> BackendResult<Option<&KvValue>> {
        self.check_open()?;
        Ok(self.data.features.get(key))
    }

    pub fn put_value(&mut self, key: FeatureKey, value: KvValue) -> BackendResult<Option<KvValue>> {
        self.check_open()?;
        Ok(self.data.features.insert(key, value))
    }

    pub fn remove_value(&mut self, key: &FeatureKey) -> BackendResult<Option<KvValue>> {
        self.check_open()?;
        Ok(self.data.features.remove(key))
    }

    // -----------------------------------------------------------------------
    // Containers and classes
    // -----------------------------------------------------------------------

    pub fn container(&self, id: &Id) -> BackendResult<Option<&ContainerRecord>> {
        self.check_open()?;
        Ok(self.data.containers.get(id))
    }

    pub fn put_container(&mut self, id: Id, record: ContainerRecord) -> BackendResult<()> {
        self.check_open()?;
        self.data.containers.insert(id, record);
        Ok(())
    }

    pub fn remove_container(&mut self, id: &Id) -> BackendResult<Option<ContainerRecord>> {
        self.check_open()?;
        Ok(self.data.containers.remove(id))
    }

    pub fn class_of(&self, id: &Id) -> BackendResult<Option<&ClassInfo>> {
        self.check_open()?;
        Ok(self.data.instances.get(id))
    }

    pub fn contains_element(&self, id: &Id) -> BackendResult<bool> {
        self.check_open()?;
        Ok(self.data.instances.contains_key(id))
    }

    /// Record `object` and its class on first use, and make it the cached
    /// handle for its id.
    pub fn register(&mut self, object: &ObjectRef) -> BackendResult<()> {
        self.check_open()?;
        self.data
            .instances
            .entry(object.id().clone())
            .or_insert_with(|| object.class().clone());
        object.set_mapped(true);
        self.objects.insert(object);
        Ok(())
    }

    pub fn reify(&mut self, id: &Id, hint: Option<&ClassInfo>) -> BackendResult<ObjectRef> {
        self.check_open()?;
        if let Some(cached) = self.objects.get(id) {
            return Ok(cached);
        }
        let class = hint.or_else(|| self.data.instances.get(id)).cloned();
        self.objects.reify(id, class)
    }

    /// Handle currently cached for `id`, without touching storage.
    pub fn cached_object(&mut self, id: &Id) -> Option<ObjectRef> {
        self.objects.get(id)
    }

    pub fn all_instances(&mut self, class: &ClassInfo) -> BackendResult<Vec<ObjectRef>> {
        self.check_open()?;
        let mut ids: Vec<Id> = self
            .data
            .instances
            .iter()
            .filter(|(_, c)| *c == class)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids.iter().map(|id| self.reify(id, Some(class))).collect()
    }

    pub fn element_count(&self) -> usize {
        self.data.instances.len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Write the snapshot, if the backend is durable.
    pub fn save(&mut self) -> BackendResult<()> {
        self.check_open()?;
        if let Some(path) = &self.path {
            write_snapshot(path, &self.data)?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        self.save()?;
        self.objects.clear();
        self.closed = true;
        Ok(())
    }
}

impl fmt::Debug for KvBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvBackend")
            .field("path", &self.path)
            .field("elements", &self.data.instances.len())
            .field("features", &self.data.features.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::object::PersistentObject;

    fn class() -> ClassInfo {
        ClassInfo::new("Node", "urn:test")
    }

    #[test]
    fn register_then_reify_returns_same_handle() {
        let mut kv = KvBackend::in_memory();
        let o = PersistentObject::new(Id::from_raw("a"), class());
        kv.register(&o).unwrap();
        let r = kv.reify(&Id::from_raw("a"), None).unwrap();
        assert!(Arc::ptr_eq(&o, &r));
        assert!(kv.contains_element(&Id::from_raw("a")).unwrap());
    }

    #[test]
    fn values_keyed_by_feature_key() {
        let mut kv = KvBackend::in_memory();
        let key = FeatureKey::new(Id::from_raw("a"), "name");
        kv.put_value(key.clone(), KvValue::Attribute(Value::from("x"))).unwrap();
        assert_eq!(
            kv.value(&key).unwrap(),
            Some(&KvValue::Attribute(Value::from("x")))
        );
        assert!(kv
            .value(&FeatureKey::new(Id::from_raw("b"), "name"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn durable_map_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::at(dir.path());
        {
            let mut kv = KvBackend::open(&config).unwrap();
            kv.register(&PersistentObject::new(Id::from_raw("a"), class()))
                .unwrap();
            kv.put_container(
                Id::from_raw("a"),
                ContainerRecord {
                    container: Id::from_raw("p"),
                    feature: "children".into(),
                },
            )
            .unwrap();
            kv.close().unwrap();
        }
        let kv = KvBackend::open(&config).unwrap();
        assert_eq!(kv.class_of(&Id::from_raw("a")).unwrap(), Some(&class()));
        assert_eq!(
            kv.container(&Id::from_raw("a")).unwrap().map(|c| c.feature.as_str()),
            Some("children")
        );
    }

    #[test]
    fn graph_directory_is_not_a_map() {
        let dir = tempfile::tempdir().unwrap();
        claim_directory(dir.path(), BackendKind::Graph).unwrap();
        let err = KvBackend::open(&BackendConfig::at(dir.path())).unwrap_err();
        assert!(matches!(err, BackendError::InvalidStore(_)));
    }
}
