use std::fmt;

use ogm_backend::ObjectRef;
use ogm_types::{ClassInfo, Feature, FeatureKey, Id};

use crate::error::{StoreError, StoreResult};
use crate::layers::LoadCounter;
use crate::traits::{PersistentStore, StoreValue};

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// One store call, as seen by the layers of a [`StorePipeline`].
#[derive(Clone, Copy, Debug)]
pub enum Request<'a> {
    Get {
        object: &'a ObjectRef,
        feature: &'a Feature,
        index: Option<usize>,
    },
    Set {
        object: &'a ObjectRef,
        feature: &'a Feature,
        index: Option<usize>,
        value: &'a StoreValue,
    },
    IsSet {
        object: &'a ObjectRef,
        feature: &'a Feature,
    },
    Unset {
        object: &'a ObjectRef,
        feature: &'a Feature,
    },
    Size {
        object: &'a ObjectRef,
        feature: &'a Feature,
    },
    Contains {
        object: &'a ObjectRef,
        feature: &'a Feature,
        value: &'a StoreValue,
    },
    IndexOf {
        object: &'a ObjectRef,
        feature: &'a Feature,
        value: &'a StoreValue,
    },
    LastIndexOf {
        object: &'a ObjectRef,
        feature: &'a Feature,
        value: &'a StoreValue,
    },
    Add {
        object: &'a ObjectRef,
        feature: &'a Feature,
        index: Option<usize>,
        value: &'a StoreValue,
    },
    Remove {
        object: &'a ObjectRef,
        feature: &'a Feature,
        index: usize,
    },
    Move {
        object: &'a ObjectRef,
        feature: &'a Feature,
        target: usize,
        source: usize,
    },
    Clear {
        object: &'a ObjectRef,
        feature: &'a Feature,
    },
    ToArray {
        object: &'a ObjectRef,
        feature: &'a Feature,
    },
    Container {
        object: &'a ObjectRef,
    },
    ContainingFeature {
        object: &'a ObjectRef,
    },
    Object {
        id: &'a Id,
    },
    AllInstances {
        class: &'a ClassInfo,
    },
    Save,
    Commit,
    Close,
}

impl<'a> Request<'a> {
    /// Operation name, used in logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Set { .. } => "set",
            Request::IsSet { .. } => "is_set",
            Request::Unset { .. } => "unset",
            Request::Size { .. } => "size",
            Request::Contains { .. } => "contains",
            Request::IndexOf { .. } => "index_of",
            Request::LastIndexOf { .. } => "last_index_of",
            Request::Add { .. } => "add",
            Request::Remove { .. } => "remove",
            Request::Move { .. } => "move",
            Request::Clear { .. } => "clear",
            Request::ToArray { .. } => "to_array",
            Request::Container { .. } => "container",
            Request::ContainingFeature { .. } => "containing_feature",
            Request::Object { .. } => "object",
            Request::AllInstances { .. } => "all_instances",
            Request::Save => "save",
            Request::Commit => "commit",
            Request::Close => "close",
        }
    }

    /// The `(object, feature)` pair addressed, if any.
    pub fn target(&self) -> Option<(&'a ObjectRef, &'a Feature)> {
        match *self {
            Request::Get { object, feature, .. }
            | Request::Set { object, feature, .. }
            | Request::IsSet { object, feature }
            | Request::Unset { object, feature }
            | Request::Size { object, feature }
            | Request::Contains { object, feature, .. }
            | Request::IndexOf { object, feature, .. }
            | Request::LastIndexOf { object, feature, .. }
            | Request::Add { object, feature, .. }
            | Request::Remove { object, feature, .. }
            | Request::Move { object, feature, .. }
            | Request::Clear { object, feature }
            | Request::ToArray { object, feature } => Some((object, feature)),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<FeatureKey> {
        self.target().map(|(o, f)| FeatureKey::of(o.id(), f))
    }

    /// Whether the call may change stored values.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Request::Set { .. }
                | Request::Unset { .. }
                | Request::Add { .. }
                | Request::Remove { .. }
                | Request::Move { .. }
                | Request::Clear { .. }
        )
    }
}

/// Result payload of a [`Request`].
#[derive(Clone, Debug)]
pub enum Response {
    Value(Option<StoreValue>),
    Taken(StoreValue),
    Flag(bool),
    Count(usize),
    Position(Option<usize>),
    Values(Vec<StoreValue>),
    Object(Option<ObjectRef>),
    Objects(Vec<ObjectRef>),
    Feature(Option<String>),
    Done,
}

impl Response {
    /// Every object carried by the response.
    pub fn objects(&self) -> Vec<&ObjectRef> {
        match self {
            Response::Value(Some(StoreValue::Object(o))) | Response::Taken(StoreValue::Object(o)) => vec![o],
            Response::Values(vs) => vs.iter().filter_map(StoreValue::as_object).collect(),
            Response::Object(Some(o)) => vec![o],
            Response::Objects(os) => os.iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn mismatch(operation: &str, response: &Response) -> StoreError {
    StoreError::InvalidStore(format!("layer answered {operation} with {response:?}"))
}

/// Forward `request` to the wrapped store.
fn dispatch(store: &mut dyn PersistentStore, request: &Request<'_>) -> StoreResult<Response> {
    Ok(match *request {
        Request::Get { object, feature, index } => Response::Value(store.get(object, feature, index)?),
        Request::Set {
            object,
            feature,
            index,
            value,
        } => Response::Value(store.set(object, feature, index, value)?),
        Request::IsSet { object, feature } => Response::Flag(store.is_set(object, feature)?),
        Request::Unset { object, feature } => {
            store.unset(object, feature)?;
            Response::Done
        }
        Request::Size { object, feature } => Response::Count(store.size(object, feature)?),
        Request::Contains { object, feature, value } => Response::Flag(store.contains(object, feature, value)?),
        Request::IndexOf { object, feature, value } => Response::Position(store.index_of(object, feature, value)?),
        Request::LastIndexOf { object, feature, value } => {
            Response::Position(store.last_index_of(object, feature, value)?)
        }
        Request::Add {
            object,
            feature,
            index,
            value,
        } => {
            store.add(object, feature, index, value)?;
            Response::Done
        }
        Request::Remove { object, feature, index } => Response::Taken(store.remove(object, feature, index)?),
        Request::Move {
            object,
            feature,
            target,
            source,
        } => Response::Taken(store.move_element(object, feature, target, source)?),
        Request::Clear { object, feature } => {
            store.clear(object, feature)?;
            Response::Done
        }
        Request::ToArray { object, feature } => Response::Values(store.to_array(object, feature)?),
        Request::Container { object } => Response::Object(store.container(object)?),
        Request::ContainingFeature { object } => Response::Feature(store.containing_feature(object)?),
        Request::Object { id } => Response::Object(store.object(id)?),
        Request::AllInstances { class } => Response::Objects(store.all_instances(class)?),
        Request::Save => {
            store.save()?;
            Response::Done
        }
        Request::Commit => {
            store.commit()?;
            Response::Done
        }
        Request::Close => {
            store.close()?;
            Response::Done
        }
    })
}

// ---------------------------------------------------------------------------
// StoreLayer
// ---------------------------------------------------------------------------

/// A middleware layer wrapped around a store.
///
/// A layer may answer a request itself from [`intercept`](Self::intercept);
/// the request then never reaches the layers below it or the store. Every
/// layer above the one that answered (or all layers, if the store
/// answered) then sees the outcome in [`observe`](Self::observe).
pub trait StoreLayer: Send {
    /// Human-readable layer name.
    fn name(&self) -> &'static str;

    fn intercept(&mut self, _request: &Request<'_>) -> Option<Response> {
        None
    }

    /// React to a finished call. `inner` is the wrapped store, for layers
    /// that issue calls of their own.
    fn observe(
        &mut self,
        _request: &Request<'_>,
        _outcome: &StoreResult<Response>,
        _inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StorePipeline
// ---------------------------------------------------------------------------

/// A store wrapped in an ordered stack of [`StoreLayer`]s.
///
/// The pipeline is itself a [`PersistentStore`], so callers never see the
/// difference between a bare store and a layered one.
pub struct StorePipeline {
    store: Box<dyn PersistentStore>,
    /// Innermost first.
    layers: Vec<Box<dyn StoreLayer>>,
    loaded: Option<LoadCounter>,
}

impl StorePipeline {
    /// A pipeline with no layers.
    pub fn new(store: Box<dyn PersistentStore>) -> Self {
        Self {
            store,
            layers: Vec::new(),
            loaded: None,
        }
    }

    /// Wrap the pipeline in `layer`, making it the new outermost layer.
    pub fn wrap(&mut self, layer: Box<dyn StoreLayer>) {
        self.layers.push(layer);
    }

    /// Track loaded objects through `counter`.
    pub fn track_loaded(&mut self, counter: LoadCounter) {
        self.loaded = Some(counter);
    }

    /// Names of the layers, innermost first.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Distinct objects loaded so far, if a counting layer is installed.
    pub fn loaded_objects(&self) -> Option<usize> {
        self.loaded.as_ref().map(LoadCounter::count)
    }

    fn run(&mut self, request: Request<'_>) -> StoreResult<Response> {
        let mut answered = None;
        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            if let Some(response) = layer.intercept(&request) {
                answered = Some((i, response));
                break;
            }
        }
        let (first_observer, outcome) = match answered {
            Some((i, response)) => (i + 1, Ok(response)),
            None => (0, dispatch(self.store.as_mut(), &request)),
        };
        for layer in self.layers[first_observer..].iter_mut() {
            layer.observe(&request, &outcome, self.store.as_mut())?;
        }
        outcome
    }
}

macro_rules! expect {
    ($response:expr, $op:literal, $variant:ident) => {
        match $response {
            Response::$variant(v) => Ok(v),
            other => Err(mismatch($op, &other)),
        }
    };
    ($response:expr, $op:literal) => {
        match $response {
            Response::Done => Ok(()),
            other => Err(mismatch($op, &other)),
        }
    };
}

impl PersistentStore for StorePipeline {
    fn get(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>) -> StoreResult<Option<StoreValue>> {
        expect!(self.run(Request::Get { object, feature, index })?, "get", Value)
    }

    fn set(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
        value: &StoreValue,
    ) -> StoreResult<Option<StoreValue>> {
        expect!(
            self.run(Request::Set {
                object,
                feature,
                index,
                value
            })?,
            "set",
            Value
        )
    }

    fn is_set(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<bool> {
        expect!(self.run(Request::IsSet { object, feature })?, "is_set", Flag)
    }

    fn unset(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        expect!(self.run(Request::Unset { object, feature })?, "unset")
    }

    fn size(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<usize> {
        expect!(self.run(Request::Size { object, feature })?, "size", Count)
    }

    fn contains(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<bool> {
        expect!(self.run(Request::Contains { object, feature, value })?, "contains", Flag)
    }

    fn index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        expect!(self.run(Request::IndexOf { object, feature, value })?, "index_of", Position)
    }

    fn last_index_of(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<Option<usize>> {
        expect!(
            self.run(Request::LastIndexOf { object, feature, value })?,
            "last_index_of",
            Position
        )
    }

    fn add(&mut self, object: &ObjectRef, feature: &Feature, index: Option<usize>, value: &StoreValue) -> StoreResult<()> {
        expect!(
            self.run(Request::Add {
                object,
                feature,
                index,
                value
            })?,
            "add"
        )
    }

    fn remove(&mut self, object: &ObjectRef, feature: &Feature, index: usize) -> StoreResult<StoreValue> {
        expect!(self.run(Request::Remove { object, feature, index })?, "remove", Taken)
    }

    fn move_element(&mut self, object: &ObjectRef, feature: &Feature, target: usize, source: usize) -> StoreResult<StoreValue> {
        expect!(
            self.run(Request::Move {
                object,
                feature,
                target,
                source
            })?,
            "move",
            Taken
        )
    }

    fn clear(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()> {
        expect!(self.run(Request::Clear { object, feature })?, "clear")
    }

    fn to_array(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<Vec<StoreValue>> {
        expect!(self.run(Request::ToArray { object, feature })?, "to_array", Values)
    }

    fn container(&mut self, object: &ObjectRef) -> StoreResult<Option<ObjectRef>> {
        expect!(self.run(Request::Container { object })?, "container", Object)
    }

    fn containing_feature(&mut self, object: &ObjectRef) -> StoreResult<Option<String>> {
        expect!(self.run(Request::ContainingFeature { object })?, "containing_feature", Feature)
    }

    fn object(&mut self, id: &Id) -> StoreResult<Option<ObjectRef>> {
        expect!(self.run(Request::Object { id })?, "object", Object)
    }

    fn all_instances(&mut self, class: &ClassInfo) -> StoreResult<Vec<ObjectRef>> {
        expect!(self.run(Request::AllInstances { class })?, "all_instances", Objects)
    }

    fn save(&mut self) -> StoreResult<()> {
        expect!(self.run(Request::Save)?, "save")
    }

    fn commit(&mut self) -> StoreResult<()> {
        expect!(self.run(Request::Commit)?, "commit")
    }

    fn close(&mut self) -> StoreResult<()> {
        expect!(self.run(Request::Close)?, "close")
    }
}

impl fmt::Debug for StorePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorePipeline")
            .field("layers", &self.layer_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectWriteStore;
    use ogm_backend::{GraphBackend, PersistentObject};
    use ogm_types::Value;

    /// Answers every `size` call with 42 and counts what it observes.
    #[derive(Default)]
    struct FixedSize {
        observed: std::sync::Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl StoreLayer for FixedSize {
        fn name(&self) -> &'static str {
            "fixed-size"
        }

        fn intercept(&mut self, request: &Request<'_>) -> Option<Response> {
            matches!(request, Request::Size { .. }).then_some(Response::Count(42))
        }

        fn observe(
            &mut self,
            request: &Request<'_>,
            _outcome: &StoreResult<Response>,
            _inner: &mut dyn PersistentStore,
        ) -> StoreResult<()> {
            self.observed.lock().push(request.operation());
            Ok(())
        }
    }

    struct Recorder {
        seen: std::sync::Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl StoreLayer for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn observe(
            &mut self,
            request: &Request<'_>,
            _outcome: &StoreResult<Response>,
            _inner: &mut dyn PersistentStore,
        ) -> StoreResult<()> {
            self.seen.lock().push(request.operation());
            Ok(())
        }
    }

    fn pipeline() -> StorePipeline {
        StorePipeline::new(Box::new(DirectWriteStore::new(GraphBackend::in_memory())))
    }

    #[test]
    fn bare_pipeline_passes_through() {
        let mut p = pipeline();
        let o = PersistentObject::new(Id::from_raw("e"), ClassInfo::new("N", "urn:t"));
        let f = Feature::attribute("name");
        p.set(&o, &f, None, &StoreValue::Attribute(Value::from("x"))).unwrap();
        assert_eq!(p.get(&o, &f, None).unwrap(), Some(StoreValue::Attribute(Value::from("x"))));
        assert_eq!(p.size(&o, &f).unwrap(), 1);
        assert!(p.layer_names().is_empty());
        assert_eq!(p.loaded_objects(), None);
    }

    #[test]
    fn intercepting_layer_hides_inner_layers() {
        let inner_seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let outer_seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut p = pipeline();
        p.wrap(Box::new(Recorder {
            seen: inner_seen.clone(),
        }));
        p.wrap(Box::new(FixedSize::default()));
        p.wrap(Box::new(Recorder {
            seen: outer_seen.clone(),
        }));
        assert_eq!(p.layer_names(), vec!["recorder", "fixed-size", "recorder"]);

        let o = PersistentObject::new(Id::from_raw("e"), ClassInfo::new("N", "urn:t"));
        let f = Feature::attributes("tags");
        assert_eq!(p.size(&o, &f).unwrap(), 42);
        assert!(inner_seen.lock().is_empty());
        assert_eq!(*outer_seen.lock(), vec!["size"]);

        p.is_set(&o, &f).unwrap();
        assert_eq!(*inner_seen.lock(), vec!["is_set"]);
        assert_eq!(*outer_seen.lock(), vec!["size", "is_set"]);
    }

    #[test]
    fn request_classification() {
        let o = PersistentObject::new(Id::from_raw("e"), ClassInfo::new("N", "urn:t"));
        let f = Feature::attribute("name");
        let clear = Request::Clear { object: &o, feature: &f };
        assert!(clear.is_mutation());
        assert_eq!(clear.key(), Some(FeatureKey::new(Id::from_raw("e"), "name")));
        assert!(!Request::Size { object: &o, feature: &f }.is_mutation());
        assert_eq!(Request::Save.key(), None);
    }
}
