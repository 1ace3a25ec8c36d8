use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use ogm_types::{Id, Value};

use crate::error::{BackendError, BackendResult};

/// Stable identifier of an edge within one [`PropertyGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(u64);

impl EdgeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Edge direction relative to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

/// A node: its properties plus the ids of its incident edges, in insertion
/// order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub properties: BTreeMap<String, Value>,
    out_edges: Vec<EdgeId>,
    in_edges: Vec<EdgeId>,
}

impl NodeRecord {
    pub fn degree(&self) -> usize {
        self.out_edges.len() + self.in_edges.len()
    }
}

/// A labeled, directed edge with its own properties.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub label: String,
    pub from: Id,
    pub to: Id,
    pub properties: BTreeMap<String, Value>,
}

/// In-memory labeled property graph.
///
/// Nodes are keyed by element [`Id`]; edges get a monotonically increasing
/// [`EdgeId`]. Removing a node removes every incident edge, so the graph
/// never holds dangling edges.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PropertyGraph {
    nodes: HashMap<Id, NodeRecord>,
    edges: BTreeMap<EdgeId, EdgeRecord>,
    next_edge: u64,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: &Id) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &Id) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &Id> {
        self.nodes.keys()
    }

    /// Add a node if absent. Returns `true` if it was created.
    pub fn add_node(&mut self, id: Id) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id, NodeRecord::default());
        true
    }

    /// Remove a node and every edge touching it. Returns `true` if the node
    /// existed.
    pub fn remove_node(&mut self, id: &Id) -> bool {
        let Some(record) = self.nodes.remove(id) else {
            return false;
        };
        for edge in record.out_edges.iter().chain(record.in_edges.iter()) {
            self.remove_edge(*edge);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Node properties
    // -----------------------------------------------------------------------

    pub fn property(&self, id: &Id, key: &str) -> Option<&Value> {
        self.nodes.get(id).and_then(|n| n.properties.get(key))
    }

    /// Set a node property, returning the previous value.
    pub fn set_property(&mut self, id: &Id, key: &str, value: Value) -> BackendResult<Option<Value>> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| BackendError::NodeNotFound(id.clone()))?;
        Ok(node.properties.insert(key.to_string(), value))
    }

    pub fn remove_property(&mut self, id: &Id, key: &str) -> Option<Value> {
        self.nodes.get_mut(id).and_then(|n| n.properties.remove(key))
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Add an edge `from -label-> to`. Both endpoints must exist.
    pub fn add_edge(&mut self, from: &Id, to: &Id, label: &str) -> BackendResult<EdgeId> {
        for endpoint in [from, to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(BackendError::NodeNotFound(endpoint.clone()));
            }
        }
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            id,
            EdgeRecord {
                id,
                label: label.to_string(),
                from: from.clone(),
                to: to.clone(),
                properties: BTreeMap::new(),
            },
        );
        if let Some(n) = self.nodes.get_mut(from) {
            n.out_edges.push(id);
        }
        if let Some(n) = self.nodes.get_mut(to) {
            n.in_edges.push(id);
        }
        Ok(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&EdgeRecord> {
        self.edges.get(&id)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<EdgeRecord> {
        let record = self.edges.remove(&id)?;
        if let Some(n) = self.nodes.get_mut(&record.from) {
            n.out_edges.retain(|e| *e != id);
        }
        if let Some(n) = self.nodes.get_mut(&record.to) {
            n.in_edges.retain(|e| *e != id);
        }
        Some(record)
    }

    pub fn edge_property(&self, id: EdgeId, key: &str) -> Option<&Value> {
        self.edges.get(&id).and_then(|e| e.properties.get(key))
    }

    pub fn set_edge_property(&mut self, id: EdgeId, key: &str, value: Value) -> BackendResult<()> {
        let edge = self
            .edges
            .get_mut(&id)
            .ok_or(BackendError::EdgeNotFound(id.0))?;
        edge.properties.insert(key.to_string(), value);
        Ok(())
    }

    /// Edges incident to `id` in `direction` with the given label, in
    /// insertion order.
    pub fn edges(&self, id: &Id, direction: Direction, label: &str) -> Vec<EdgeId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let incident = match direction {
            Direction::Out => &node.out_edges,
            Direction::In => &node.in_edges,
        };
        incident
            .iter()
            .copied()
            .filter(|e| self.edges.get(e).is_some_and(|r| r.label == label))
            .collect()
    }

    /// Nodes at the other end of the matching edges.
    pub fn neighbors(&self, id: &Id, direction: Direction, label: &str) -> Vec<Id> {
        self.edges(id, direction, label)
            .into_iter()
            .filter_map(|e| self.edges.get(&e))
            .map(|r| match direction {
                Direction::Out => r.to.clone(),
                Direction::In => r.from.clone(),
            })
            .collect()
    }

    /// First neighbor over a label, if any.
    pub fn neighbor(&self, id: &Id, direction: Direction, label: &str) -> Option<Id> {
        self.neighbors(id, direction, label).into_iter().next()
    }

    /// Remove every edge incident to `id` in `direction` with the label.
    /// Returns the removed records.
    pub fn remove_edges(&mut self, id: &Id, direction: Direction, label: &str) -> Vec<EdgeRecord> {
        self.edges(id, direction, label)
            .into_iter()
            .filter_map(|e| self.remove_edge(e))
            .collect()
    }

    /// Merge every node, property, and edge of `self` into `target`.
    ///
    /// Node properties overwrite those already in the target. Edges are
    /// always added, with fresh ids in the target.
    pub fn copy_into(&self, target: &mut PropertyGraph) -> BackendResult<()> {
        for (id, node) in &self.nodes {
            target.add_node(id.clone());
            for (key, value) in &node.properties {
                target.set_property(id, key, value.clone())?;
            }
        }
        for edge in self.edges.values() {
            let copied = target.add_edge(&edge.from, &edge.to, &edge.label)?;
            for (key, value) in &edge.properties {
                target.set_edge_property(copied, key, value.clone())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Id {
        Id::from_raw(s)
    }

    fn graph_with(nodes: &[&str]) -> PropertyGraph {
        let mut g = PropertyGraph::new();
        for n in nodes {
            g.add_node(id(n));
        }
        g
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut g = PropertyGraph::new();
        assert!(g.add_node(id("a")));
        assert!(!g.add_node(id("a")));
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn properties_set_and_remove() {
        let mut g = graph_with(&["a"]);
        assert_eq!(g.set_property(&id("a"), "name", Value::from("x")).unwrap(), None);
        assert_eq!(
            g.set_property(&id("a"), "name", Value::from("y")).unwrap(),
            Some(Value::from("x"))
        );
        assert_eq!(g.property(&id("a"), "name"), Some(&Value::from("y")));
        assert_eq!(g.remove_property(&id("a"), "name"), Some(Value::from("y")));
        assert!(g.property(&id("a"), "name").is_none());
    }

    #[test]
    fn property_on_missing_node_fails() {
        let mut g = PropertyGraph::new();
        let err = g.set_property(&id("ghost"), "k", Value::Int(1)).unwrap_err();
        assert!(matches!(err, BackendError::NodeNotFound(_)));
    }

    #[test]
    fn edges_filter_by_label_and_direction() {
        let mut g = graph_with(&["a", "b", "c"]);
        g.add_edge(&id("a"), &id("b"), "knows").unwrap();
        g.add_edge(&id("a"), &id("c"), "knows").unwrap();
        g.add_edge(&id("a"), &id("c"), "owns").unwrap();

        assert_eq!(g.neighbors(&id("a"), Direction::Out, "knows"), vec![id("b"), id("c")]);
        assert_eq!(g.neighbors(&id("c"), Direction::In, "owns"), vec![id("a")]);
        assert!(g.neighbors(&id("b"), Direction::Out, "knows").is_empty());
    }

    #[test]
    fn edge_requires_both_endpoints() {
        let mut g = graph_with(&["a"]);
        assert!(g.add_edge(&id("a"), &id("missing"), "x").is_err());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn removing_node_removes_incident_edges() {
        let mut g = graph_with(&["a", "b", "c"]);
        g.add_edge(&id("a"), &id("b"), "x").unwrap();
        g.add_edge(&id("b"), &id("c"), "y").unwrap();
        g.add_edge(&id("a"), &id("c"), "z").unwrap();

        assert!(g.remove_node(&id("b")));
        assert_eq!(g.edge_count(), 1);
        assert!(g.neighbors(&id("a"), Direction::Out, "x").is_empty());
        assert!(g.neighbors(&id("c"), Direction::In, "y").is_empty());
    }

    #[test]
    fn edge_properties() {
        let mut g = graph_with(&["a", "b"]);
        let e = g.add_edge(&id("a"), &id("b"), "ref").unwrap();
        g.set_edge_property(e, "position", Value::Int(2)).unwrap();
        assert_eq!(g.edge_property(e, "position"), Some(&Value::Int(2)));
        g.remove_edge(e);
        assert!(g.set_edge_property(e, "position", Value::Int(3)).is_err());
    }

    #[test]
    fn copy_into_preserves_structure() {
        let mut src = graph_with(&["a", "b"]);
        src.set_property(&id("a"), "name", Value::from("A")).unwrap();
        let e = src.add_edge(&id("a"), &id("b"), "ref").unwrap();
        src.set_edge_property(e, "position", Value::Int(0)).unwrap();

        let mut dst = PropertyGraph::new();
        src.copy_into(&mut dst).unwrap();

        assert_eq!(dst.node_count(), 2);
        assert_eq!(dst.property(&id("a"), "name"), Some(&Value::from("A")));
        let copied = dst.edges(&id("a"), Direction::Out, "ref");
        assert_eq!(copied.len(), 1);
        assert_eq!(dst.edge_property(copied[0], "position"), Some(&Value::Int(0)));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn node_removal_never_leaves_dangling_edges(
                edges in prop::collection::vec((0u8..6, 0u8..6), 0..40),
                removed in prop::collection::vec(0u8..6, 0..6),
            ) {
                let mut g = PropertyGraph::new();
                for n in 0u8..6 {
                    g.add_node(id(&n.to_string()));
                }
                for (a, b) in &edges {
                    g.add_edge(&id(&a.to_string()), &id(&b.to_string()), "e").unwrap();
                }
                for n in &removed {
                    g.remove_node(&id(&n.to_string()));
                }
                for edge in g.edges.values() {
                    prop_assert!(g.contains_node(&edge.from));
                    prop_assert!(g.contains_node(&edge.to));
                }
                let incident: usize = g.nodes.values().map(|n| n.out_edges.len()).sum();
                prop_assert_eq!(incident, g.edge_count());
            }
        }
    }
}
