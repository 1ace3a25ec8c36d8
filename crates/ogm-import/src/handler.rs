use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use ogm_backend::{Direction, GraphBackend, INSTANCE_OF};
use ogm_store::containment::{release_child, update_containment, ROOT_CONTENTS};
use ogm_store::{layout, Mapping, NodeList, StoreError, StoreOptions};
use ogm_types::{ClassInfo, Id, Value};

use crate::error::{ImportError, ImportResult};

/// Receiver of import events.
///
/// `index = None` on an attribute or reference appends.
pub trait ImportHandler {
    fn start_document(&mut self) -> ImportResult<()>;

    /// Declare `id` as an instance of `class`. Root elements are also
    /// listed in the contents of the `ROOT` element.
    fn add_element(&mut self, id: &Id, class: &ClassInfo, is_root: bool) -> ImportResult<()>;

    fn add_attribute(
        &mut self,
        id: &Id,
        name: &str,
        index: Option<usize>,
        many: bool,
        value: Value,
    ) -> ImportResult<()>;

    /// `target` may be declared later in the document.
    fn add_reference(
        &mut self,
        id: &Id,
        name: &str,
        index: Option<usize>,
        many: bool,
        containment: bool,
        target: &Id,
    ) -> ImportResult<()>;

    fn set_class(&mut self, id: &Id, class: &ClassInfo) -> ImportResult<()>;

    fn end_document(&mut self) -> ImportResult<()>;
}

/// Counts of what an import wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub elements: usize,
    pub attributes: usize,
    pub references: usize,
    pub commits: usize,
}

/// Import handler writing the persisted layout directly into a
/// [`GraphBackend`].
pub struct GraphImportHandler {
    backend: GraphBackend,
    mapping: Mapping,
    autocommit: Option<usize>,
    pending: usize,
    started: bool,
    /// Reference targets seen before their declaration.
    unresolved: BTreeSet<Id>,
    summary: ImportSummary,
}

impl GraphImportHandler {
    /// Handler honoring the mapping and autocommit chunk of `options`.
    pub fn new(backend: GraphBackend, options: &StoreOptions) -> ImportResult<Self> {
        options.validate()?;
        Ok(Self {
            backend,
            mapping: options.mapping,
            autocommit: options.autocommit,
            pending: 0,
            started: false,
            unresolved: BTreeSet::new(),
            summary: ImportSummary::default(),
        })
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    pub fn backend(&self) -> &GraphBackend {
        &self.backend
    }

    pub fn into_backend(self) -> GraphBackend {
        self.backend
    }

    fn check_started(&self) -> ImportResult<()> {
        if !self.started {
            return Err(ImportError::NotStarted);
        }
        Ok(())
    }

    fn require_element(&self, id: &Id) -> ImportResult<()> {
        if self.backend.graph()?.contains_node(id) && !self.unresolved.contains(id) {
            return Ok(());
        }
        Err(ImportError::UnknownElement(id.clone()))
    }

    /// Point the conformance edge of `id` at `class`, creating the node if
    /// needed.
    fn assign_class(&mut self, id: &Id, class: &ClassInfo) -> ImportResult<()> {
        let metaclass = self.backend.ensure_metaclass(class)?;
        let graph = self.backend.graph_mut()?;
        graph.add_node(id.clone());
        graph.remove_edges(id, Direction::Out, INSTANCE_OF);
        graph.add_edge(id, &metaclass, INSTANCE_OF)?;
        Ok(())
    }

    /// Current length of the many-valued reference `id.name`.
    fn reference_count(&self, id: &Id, name: &str) -> ImportResult<usize> {
        let graph = self.backend.graph()?;
        let size = match self.mapping {
            Mapping::DirectWrite => layout::read_size(graph, id, name)?,
            Mapping::LongList => NodeList::open(graph, id, name)
                .map(|list| list.size(graph))
                .transpose()?,
        };
        Ok(size.unwrap_or(0))
    }

    fn link(
        &mut self,
        id: &Id,
        name: &str,
        index: Option<usize>,
        many: bool,
        containment: bool,
        target: &Id,
    ) -> ImportResult<()> {
        if let Some(index) = index.filter(|_| many) {
            let size = self.reference_count(id, name)?;
            if index > size {
                return Err(StoreError::OutOfRange { index, size }.into());
            }
        }
        let graph = self.backend.graph_mut()?;
        if graph.add_node(target.clone()) {
            self.unresolved.insert(target.clone());
        }
        if containment {
            update_containment(graph, name, id, target)?;
        }
        if !many {
            if let Some(old) = layout::set_single_reference(graph, id, name, target)? {
                if containment && &old != target {
                    release_child(graph, id, name, &old);
                }
            }
            return Ok(());
        }
        match self.mapping {
            Mapping::DirectWrite => layout::insert_reference(graph, id, name, index, target)?,
            Mapping::LongList => NodeList::open_or_create(graph, id, name)?.insert(graph, index, target, &mut None)?,
        }
        Ok(())
    }

    /// Count one write and commit when a chunk is full.
    fn tick(&mut self) -> ImportResult<()> {
        self.pending += 1;
        if let Some(chunk) = self.autocommit {
            if self.pending >= chunk {
                self.backend.commit()?;
                self.summary.commits += 1;
                self.pending = 0;
                debug!(chunk, "import chunk committed");
            }
        }
        Ok(())
    }
}

impl ImportHandler for GraphImportHandler {
    fn start_document(&mut self) -> ImportResult<()> {
        self.assign_class(&Id::root(), &ClassInfo::root())?;
        self.started = true;
        debug!("import started");
        Ok(())
    }

    fn add_element(&mut self, id: &Id, class: &ClassInfo, is_root: bool) -> ImportResult<()> {
        self.check_started()?;
        if self.backend.class_of(id)?.is_some() {
            return Err(ImportError::DuplicateElement(id.clone()));
        }
        self.assign_class(id, class)?;
        self.unresolved.remove(id);
        if is_root {
            self.link(&Id::root(), ROOT_CONTENTS, None, true, false, id)?;
        }
        self.summary.elements += 1;
        self.tick()
    }

    fn add_attribute(
        &mut self,
        id: &Id,
        name: &str,
        index: Option<usize>,
        many: bool,
        value: Value,
    ) -> ImportResult<()> {
        self.check_started()?;
        self.require_element(id)?;
        let graph = self.backend.graph_mut()?;
        if many {
            layout::insert_attribute(graph, id, name, index, value)?;
        } else {
            graph.set_property(id, name, value)?;
        }
        self.summary.attributes += 1;
        self.tick()
    }

    fn add_reference(
        &mut self,
        id: &Id,
        name: &str,
        index: Option<usize>,
        many: bool,
        containment: bool,
        target: &Id,
    ) -> ImportResult<()> {
        self.check_started()?;
        self.require_element(id)?;
        self.link(id, name, index, many, containment, target)?;
        self.summary.references += 1;
        self.tick()
    }

    fn set_class(&mut self, id: &Id, class: &ClassInfo) -> ImportResult<()> {
        self.check_started()?;
        if !self.backend.graph()?.contains_node(id) {
            return Err(ImportError::UnknownElement(id.clone()));
        }
        self.assign_class(id, class)?;
        self.unresolved.remove(id);
        self.tick()
    }

    fn end_document(&mut self) -> ImportResult<()> {
        self.check_started()?;
        if let Some(missing) = self.unresolved.first() {
            return Err(ImportError::UnknownElement(missing.clone()));
        }
        self.backend.save()?;
        self.started = false;
        info!(
            elements = self.summary.elements,
            attributes = self.summary.attributes,
            references = self.summary.references,
            commits = self.summary.commits,
            "import finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogm_backend::BackendConfig;
    use ogm_store::{DirectWriteStore, LongListStore, PersistentStore, StoreValue};
    use ogm_types::Feature;

    fn class() -> ClassInfo {
        ClassInfo::new("Node", "urn:test")
    }

    fn id(s: &str) -> Id {
        Id::from_raw(s)
    }

    fn handler(options: &StoreOptions) -> GraphImportHandler {
        let mut h = GraphImportHandler::new(GraphBackend::in_memory(), options).unwrap();
        h.start_document().unwrap();
        h
    }

    #[test]
    fn events_before_start_are_rejected() {
        let mut h = GraphImportHandler::new(GraphBackend::in_memory(), &StoreOptions::default()).unwrap();
        assert!(matches!(
            h.add_element(&id("a"), &class(), true),
            Err(ImportError::NotStarted)
        ));
    }

    #[test]
    fn imported_model_reads_back_through_store() {
        let mut h = handler(&StoreOptions::default());
        h.add_element(&id("a"), &class(), true).unwrap();
        h.add_element(&id("b"), &class(), false).unwrap();
        h.add_attribute(&id("a"), "name", None, false, Value::from("A")).unwrap();
        h.add_attribute(&id("a"), "tags", None, true, Value::from("x")).unwrap();
        h.add_attribute(&id("a"), "tags", Some(0), true, Value::from("w")).unwrap();
        h.add_reference(&id("a"), "children", None, true, true, &id("b")).unwrap();
        h.end_document().unwrap();
        assert_eq!(
            h.summary(),
            &ImportSummary {
                elements: 2,
                attributes: 3,
                references: 1,
                commits: 0
            }
        );

        let mut store = DirectWriteStore::new(h.into_backend());
        let a = store.object(&id("a")).unwrap().unwrap();
        assert_eq!(a.class(), &class());
        assert_eq!(
            store.get(&a, &Feature::attribute("name"), None).unwrap(),
            Some(StoreValue::Attribute(Value::from("A")))
        );
        assert_eq!(
            store.to_array(&a, &Feature::attributes("tags")).unwrap(),
            vec![StoreValue::Attribute(Value::from("w")), StoreValue::Attribute(Value::from("x"))]
        );
        let children = Feature::containment("children", true);
        let b = store.get(&a, &children, Some(0)).unwrap().unwrap();
        let b = b.as_object().unwrap();
        assert_eq!(store.container(b).unwrap().unwrap().id(), a.id());
        assert_eq!(store.containing_feature(b).unwrap().as_deref(), Some("children"));
    }

    #[test]
    fn root_elements_are_root_contents() {
        let mut h = handler(&StoreOptions::default());
        h.add_element(&id("a"), &class(), true).unwrap();
        h.add_element(&id("b"), &class(), true).unwrap();
        h.end_document().unwrap();

        let mut store = DirectWriteStore::new(h.into_backend());
        let root = store.object(&Id::root()).unwrap().unwrap();
        assert_eq!(root.class(), &ClassInfo::root());
        let contents = store.to_array(&root, &Feature::references(ROOT_CONTENTS)).unwrap();
        let ids: Vec<&Id> = contents.iter().filter_map(|v| v.as_object()).map(|o| o.id()).collect();
        assert_eq!(ids, vec![&id("a"), &id("b")]);
    }

    #[test]
    fn duplicate_element_is_rejected() {
        let mut h = handler(&StoreOptions::default());
        h.add_element(&id("a"), &class(), false).unwrap();
        assert!(matches!(
            h.add_element(&id("a"), &class(), false),
            Err(ImportError::DuplicateElement(_))
        ));
    }

    #[test]
    fn forward_references_resolve_on_declaration() {
        let mut h = handler(&StoreOptions::default());
        h.add_element(&id("a"), &class(), false).unwrap();
        h.add_reference(&id("a"), "next", None, false, false, &id("later")).unwrap();
        assert!(matches!(
            h.add_attribute(&id("later"), "name", None, false, Value::from("x")),
            Err(ImportError::UnknownElement(_))
        ));
        h.add_element(&id("later"), &class(), false).unwrap();
        h.end_document().unwrap();
    }

    #[test]
    fn undeclared_target_fails_at_end() {
        let mut h = handler(&StoreOptions::default());
        h.add_element(&id("a"), &class(), false).unwrap();
        h.add_reference(&id("a"), "next", None, false, false, &id("ghost")).unwrap();
        match h.end_document() {
            Err(ImportError::UnknownElement(missing)) => assert_eq!(missing, id("ghost")),
            other => panic!("expected unknown element, got {other:?}"),
        }
    }

    #[test]
    fn reference_past_the_end_writes_nothing() {
        for mapping in [Mapping::DirectWrite, Mapping::LongList] {
            let options = StoreOptions::builder().mapping(mapping).build().unwrap();
            let mut h = handler(&options);
            h.add_element(&id("a"), &class(), false).unwrap();
            h.add_element(&id("b"), &class(), false).unwrap();
            h.add_reference(&id("a"), "children", None, true, true, &id("b")).unwrap();
            let nodes = h.backend().graph().unwrap().node_count();
            let edges = h.backend().graph().unwrap().edge_count();

            assert!(matches!(
                h.add_reference(&id("a"), "children", Some(2), true, true, &id("c")),
                Err(ImportError::Store(StoreError::OutOfRange { index: 2, size: 1 }))
            ));
            let graph = h.backend().graph().unwrap();
            assert_eq!(graph.node_count(), nodes);
            assert_eq!(graph.edge_count(), edges);
            assert_eq!(h.summary().references, 1);
            h.end_document().unwrap();
        }
    }

    #[test]
    fn set_class_replaces_conformance() {
        let mut h = handler(&StoreOptions::default());
        h.add_element(&id("a"), &class(), false).unwrap();
        let other = ClassInfo::new("Leaf", "urn:test");
        h.set_class(&id("a"), &other).unwrap();
        assert_eq!(h.backend().class_of(&id("a")).unwrap(), Some(other));
        assert!(matches!(
            h.set_class(&id("nope"), &class()),
            Err(ImportError::UnknownElement(_))
        ));
    }

    #[test]
    fn long_list_mapping_builds_lists() {
        let options = StoreOptions::builder().long_list().build().unwrap();
        let mut h = handler(&options);
        h.add_element(&id("p"), &class(), true).unwrap();
        for child in ["x", "y", "z"] {
            h.add_element(&id(child), &class(), false).unwrap();
        }
        h.add_reference(&id("p"), "items", None, true, true, &id("x")).unwrap();
        h.add_reference(&id("p"), "items", None, true, true, &id("y")).unwrap();
        h.add_reference(&id("p"), "items", Some(1), true, true, &id("z")).unwrap();
        h.end_document().unwrap();

        let mut store = LongListStore::new(h.into_backend());
        let p = store.object(&id("p")).unwrap().unwrap();
        let items = Feature::containment("items", true);
        let ids: Vec<Id> = store
            .to_array(&p, &items)
            .unwrap()
            .iter()
            .filter_map(|v| v.as_object().map(|o| o.id().clone()))
            .collect();
        assert_eq!(ids, vec![id("x"), id("z"), id("y")]);
        let z = store.object(&id("z")).unwrap().unwrap();
        assert_eq!(store.container(&z).unwrap().unwrap().id(), p.id());
    }

    #[test]
    fn autocommit_commits_full_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::at(dir.path()).transactional(true);
        let options = StoreOptions::builder().autocommit_chunk(2).build().unwrap();
        let mut h = GraphImportHandler::new(GraphBackend::open(&config).unwrap(), &options).unwrap();
        h.start_document().unwrap();
        for n in 0..5 {
            h.add_element(&id(&format!("e{n}")), &class(), false).unwrap();
        }
        assert_eq!(h.summary().commits, 2);
        h.end_document().unwrap();
        h.into_backend().close().unwrap();

        let reopened = GraphBackend::open(&config).unwrap();
        assert_eq!(reopened.classes().unwrap().iter().find(|(c, _)| *c == class()).map(|(_, n)| *n), Some(5));
    }
}
