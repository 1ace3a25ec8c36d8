use std::fmt;

use tracing::{debug, info};

use ogm_types::{ClassInfo, Id};

use crate::cache::{NodeCache, ReificationCache};
use crate::config::{claim_directory, BackendConfig, BackendKind};
use crate::engine::{FileEngine, GraphEngine, MemoryEngine};
use crate::error::{BackendError, BackendResult};
use crate::graph::{Direction, PropertyGraph};
use crate::object::ObjectRef;

/// Label of the conformance edge from an element to its metaclass node.
pub const INSTANCE_OF: &str = "instanceOf";

/// Metaclass node property holding the class name.
pub const CLASS_NAME_KEY: &str = "name";

/// Metaclass node property holding the namespace URI.
pub const NS_URI_KEY: &str = "nsURI";

/// File name of the graph snapshot inside a storage directory.
pub const GRAPH_SNAPSHOT: &str = "graph.snap";

/// Graph backend: a [`GraphEngine`] plus the element-level bookkeeping the
/// stores rely on.
///
/// - Every mapped element has exactly one node keyed by its id.
/// - Every element node has one `instanceOf` edge to the metaclass node of
///   its class; metaclass nodes are shared.
/// - Reified objects are cached, so repeated reification of a cached id
///   returns the same handle.
///
/// All operations fail with [`BackendError::InvalidStore`] after
/// [`close`](Self::close).
pub struct GraphBackend {
    engine: Box<dyn GraphEngine>,
    nodes: NodeCache,
    objects: ReificationCache,
    closed: bool,
}

impl GraphBackend {
    /// Open the backend described by `config`.
    pub fn open(config: &BackendConfig) -> BackendResult<Self> {
        let engine: Box<dyn GraphEngine> = match &config.path {
            None => Box::new(MemoryEngine::new()),
            Some(dir) => {
                claim_directory(dir, BackendKind::Graph)?;
                Box::new(FileEngine::open(&dir.join(GRAPH_SNAPSHOT), config.transactional)?)
            }
        };
        info!(
            engine = engine.name(),
            transactional = engine.supports_transactions(),
            "graph backend opened"
        );
        Ok(Self::with_engine(engine, config))
    }

    /// Volatile backend with default caches.
    pub fn in_memory() -> Self {
        Self::with_engine(Box::new(MemoryEngine::new()), &BackendConfig::in_memory())
    }

    pub fn with_engine(engine: Box<dyn GraphEngine>, config: &BackendConfig) -> Self {
        Self {
            engine,
            nodes: NodeCache::new(config.node_cache_capacity),
            objects: ReificationCache::new(config.object_cache_capacity),
            closed: false,
        }
    }

    fn check_open(&self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::InvalidStore("backend is closed".into()));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn supports_transactions(&self) -> bool {
        self.engine.supports_transactions()
    }

    pub fn graph(&self) -> BackendResult<&PropertyGraph> {
        self.check_open()?;
        Ok(self.engine.graph())
    }

    pub fn graph_mut(&mut self) -> BackendResult<&mut PropertyGraph> {
        self.check_open()?;
        Ok(self.engine.graph_mut())
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Whether a node exists for `id`.
    pub fn node_for(&mut self, id: &Id) -> BackendResult<bool> {
        self.check_open()?;
        if let Some(known) = self.nodes.get(id) {
            return Ok(known);
        }
        let exists = self.engine.graph().contains_node(id);
        if exists {
            self.nodes.put(id, true);
        }
        Ok(exists)
    }

    /// Return the node of `object`, creating it and its conformance edge on
    /// first use.
    ///
    /// The object is marked mapped and becomes the cached handle for its id.
    pub fn get_or_create_node(&mut self, object: &ObjectRef) -> BackendResult<Id> {
        self.check_open()?;
        let id = object.id().clone();
        let created = self.engine.graph_mut().add_node(id.clone());
        if self.engine.graph().neighbor(&id, Direction::Out, INSTANCE_OF).is_none() {
            let metaclass = self.ensure_metaclass(object.class())?;
            self.engine.graph_mut().add_edge(&id, &metaclass, INSTANCE_OF)?;
        }
        if created {
            debug!(id = %id, class = %object.class(), "node created");
        }
        self.nodes.put(&id, true);
        object.set_mapped(true);
        self.objects.insert(object);
        Ok(id)
    }

    /// Return the metaclass node of `class`, creating it if needed.
    pub fn ensure_metaclass(&mut self, class: &ClassInfo) -> BackendResult<Id> {
        self.check_open()?;
        let id = class.metaclass_id();
        let graph = self.engine.graph_mut();
        if graph.add_node(id.clone()) {
            graph.set_property(&id, CLASS_NAME_KEY, class.name.as_str().into())?;
            graph.set_property(&id, NS_URI_KEY, class.ns_uri.as_str().into())?;
        }
        Ok(id)
    }

    /// Add a bare node with no class, for auxiliary structures.
    pub fn add_node(&mut self, id: Id) -> BackendResult<()> {
        self.check_open()?;
        self.engine.graph_mut().add_node(id);
        Ok(())
    }

    /// Remove a node, its edges, and every cache entry for its id.
    pub fn remove_node(&mut self, id: &Id) -> BackendResult<bool> {
        self.check_open()?;
        self.nodes.invalidate(id);
        self.objects.invalidate(id);
        Ok(self.engine.graph_mut().remove_node(id))
    }

    // -----------------------------------------------------------------------
    // Classes and reification
    // -----------------------------------------------------------------------

    /// Class recorded for `id` through its conformance edge.
    pub fn class_of(&self, id: &Id) -> BackendResult<Option<ClassInfo>> {
        let graph = self.graph()?;
        let Some(metaclass) = graph.neighbor(id, Direction::Out, INSTANCE_OF) else {
            return Ok(None);
        };
        let name = graph.property(&metaclass, CLASS_NAME_KEY).and_then(|v| v.as_text());
        let ns_uri = graph.property(&metaclass, NS_URI_KEY).and_then(|v| v.as_text());
        Ok(match (name, ns_uri) {
            (Some(name), Some(ns_uri)) => Some(ClassInfo::new(name, ns_uri)),
            _ => None,
        })
    }

    /// Turn a stored node into a live object.
    ///
    /// A cached handle wins. Otherwise `hint` is used as the class, falling
    /// back to the conformance edge; with neither, the call fails with
    /// [`BackendError::MissingClassInfo`].
    pub fn reify(&mut self, id: &Id, hint: Option<&ClassInfo>) -> BackendResult<ObjectRef> {
        self.check_open()?;
        if let Some(cached) = self.objects.get(id) {
            return Ok(cached);
        }
        let class = match hint {
            Some(class) => Some(class.clone()),
            None => self.class_of(id)?,
        };
        self.objects.reify(id, class)
    }

    /// Handle currently cached for `id`, without touching storage.
    pub fn cached_object(&mut self, id: &Id) -> Option<ObjectRef> {
        self.objects.get(id)
    }

    /// Every element conforming exactly to `class`.
    pub fn all_instances(&mut self, class: &ClassInfo) -> BackendResult<Vec<ObjectRef>> {
        let metaclass = class.metaclass_id();
        let ids = self.graph()?.neighbors(&metaclass, Direction::In, INSTANCE_OF);
        ids.iter().map(|id| self.reify(id, Some(class))).collect()
    }

    /// Every class with at least one instance, with its instance count.
    pub fn classes(&self) -> BackendResult<Vec<(ClassInfo, usize)>> {
        let graph = self.graph()?;
        let mut classes: Vec<(ClassInfo, usize)> = graph
            .node_ids()
            .filter_map(|id| {
                let count = graph.edges(id, Direction::In, INSTANCE_OF).len();
                if count == 0 {
                    return None;
                }
                let name = graph.property(id, CLASS_NAME_KEY)?.as_text()?;
                let ns_uri = graph.property(id, NS_URI_KEY)?.as_text()?;
                Some((ClassInfo::new(name, ns_uri), count))
            })
            .collect();
        classes.sort();
        Ok(classes)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Commit pending changes. A no-op on non-transactional engines.
    pub fn commit(&mut self) -> BackendResult<()> {
        self.check_open()?;
        if self.engine.supports_transactions() {
            self.engine.commit()?;
            debug!(engine = self.engine.name(), "committed");
        }
        Ok(())
    }

    /// Drop uncommitted changes and every cached handle.
    pub fn rollback(&mut self) -> BackendResult<()> {
        self.check_open()?;
        self.engine.rollback()?;
        self.nodes.clear();
        self.objects.clear();
        Ok(())
    }

    /// Make the current state durable: commit when transactional, flush
    /// otherwise.
    pub fn save(&mut self) -> BackendResult<()> {
        self.check_open()?;
        if self.engine.supports_transactions() {
            self.engine.commit()
        } else {
            self.engine.flush()
        }
    }

    /// Shut the engine down. Idempotent.
    pub fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        self.engine.shutdown()?;
        self.nodes.clear();
        self.objects.clear();
        self.closed = true;
        info!(engine = self.engine.name(), "graph backend closed");
        Ok(())
    }

    /// Copy the whole graph, metaclass index included, into `target`.
    pub fn copy_to(&self, target: &mut GraphBackend) -> BackendResult<()> {
        let source = self.graph()?;
        source.copy_into(target.graph_mut()?)?;
        info!(
            nodes = source.node_count(),
            edges = source.edge_count(),
            "graph copied"
        );
        Ok(())
    }
}

impl fmt::Debug for GraphBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBackend")
            .field("engine", &self.engine.name())
            .field("nodes", &self.engine.graph().node_count())
            .field("cached_objects", &self.objects.len())
            .field("closed", &self.closed)
            .finish()
    }
}
