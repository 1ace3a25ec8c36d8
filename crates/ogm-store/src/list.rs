//! Linked-node encoding for many-valued references.
//!
//! ```text
//! owner -[feature]-> base {size}
//! base -[head]-> n0 -[next]-> n1 -[next]-> ... -[next]-> nk <-[tail]- base
//! ni -[value_<feature>]-> target_i
//! ```
//!
//! Nodes are never renumbered: indices are implicit in the chain, so an
//! insertion or removal touches O(1) edges after locating its position.

use std::collections::HashSet;

use ogm_backend::{Direction, PropertyGraph};
use ogm_types::{Id, Value};

use crate::error::{StoreError, StoreResult};
use crate::layout::count_value;

pub const HEAD: &str = "head";
pub const TAIL: &str = "tail";
pub const NEXT: &str = "next";
pub const SIZE: &str = "size";

/// Label of the edge from a list node to its value.
pub fn value_label(feature: &str) -> String {
    format!("value_{feature}")
}

/// Last position visited in one list, reused by the next positional lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub index: usize,
    pub node: Id,
}

/// Handle on one persisted list. Holds no graph borrow.
#[derive(Clone, Debug)]
pub struct NodeList {
    base: Id,
    value_label: String,
}

impl NodeList {
    /// The list of `owner.feature`, if one was ever written.
    pub fn open(graph: &PropertyGraph, owner: &Id, feature: &str) -> Option<Self> {
        let base = graph.neighbor(owner, Direction::Out, feature)?;
        Some(Self {
            base,
            value_label: value_label(feature),
        })
    }

    /// The list of `owner.feature`, creating an empty one if needed.
    pub fn open_or_create(graph: &mut PropertyGraph, owner: &Id, feature: &str) -> StoreResult<Self> {
        if let Some(list) = Self::open(graph, owner, feature) {
            return Ok(list);
        }
        let base = Id::generate();
        graph.add_node(base.clone());
        graph.add_edge(owner, &base, feature)?;
        graph.set_property(&base, SIZE, Value::Int(0))?;
        Ok(Self {
            base,
            value_label: value_label(feature),
        })
    }

    pub fn base(&self) -> &Id {
        &self.base
    }

    pub fn size(&self, graph: &PropertyGraph) -> StoreResult<usize> {
        let value = graph
            .property(&self.base, SIZE)
            .ok_or_else(|| StoreError::inconsistent(&self.base, "list base without size"))?;
        value
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| StoreError::inconsistent(&self.base, format!("invalid list size {value}")))
    }

    fn set_size(&self, graph: &mut PropertyGraph, size: usize) -> StoreResult<()> {
        graph.set_property(&self.base, SIZE, count_value(&self.base, size)?)?;
        Ok(())
    }

    fn pointer(&self, graph: &PropertyGraph, label: &str) -> Option<Id> {
        graph.neighbor(&self.base, Direction::Out, label)
    }

    fn set_pointer(&self, graph: &mut PropertyGraph, label: &str, node: Option<&Id>) -> StoreResult<()> {
        graph.remove_edges(&self.base, Direction::Out, label);
        if let Some(node) = node {
            graph.add_edge(&self.base, node, label)?;
        }
        Ok(())
    }

    fn next(graph: &PropertyGraph, node: &Id) -> Option<Id> {
        graph.neighbor(node, Direction::Out, NEXT)
    }

    fn prev(graph: &PropertyGraph, node: &Id) -> Option<Id> {
        graph.neighbor(node, Direction::In, NEXT)
    }

    fn value(&self, graph: &PropertyGraph, node: &Id) -> StoreResult<Id> {
        graph
            .neighbor(node, Direction::Out, &self.value_label)
            .ok_or_else(|| StoreError::inconsistent(node, "list node without value"))
    }

    fn step(&self, graph: &PropertyGraph, node: &Id, forward: bool) -> StoreResult<Id> {
        let next = if forward {
            Self::next(graph, node)
        } else {
            Self::prev(graph, node)
        };
        next.ok_or_else(|| StoreError::inconsistent(&self.base, "list chain ends before its size"))
    }

    /// Node at `index`, walking from whichever of head, tail, or `cursor`
    /// is nearest. The cursor is moved to the result.
    pub fn node_at(&self, graph: &PropertyGraph, index: usize, cursor: &mut Option<Cursor>) -> StoreResult<Id> {
        let size = self.size(graph)?;
        if index >= size {
            return Err(StoreError::OutOfRange { index, size });
        }

        let missing = |label: &str| StoreError::inconsistent(&self.base, format!("non-empty list without {label}"));
        let from_tail = size - 1 - index;
        let mut start = (self.pointer(graph, HEAD).ok_or_else(|| missing(HEAD))?, 0usize, true);
        let mut distance = index;
        if from_tail < distance {
            start = (self.pointer(graph, TAIL).ok_or_else(|| missing(TAIL))?, size - 1, false);
            distance = from_tail;
        }
        if let Some(c) = cursor.as_ref() {
            if c.index < size && graph.contains_node(&c.node) && c.index.abs_diff(index) < distance {
                start = (c.node.clone(), c.index, index >= c.index);
                distance = c.index.abs_diff(index);
            }
        }

        let (mut node, _, forward) = start;
        for _ in 0..distance {
            node = self.step(graph, &node, forward)?;
        }
        *cursor = Some(Cursor {
            index,
            node: node.clone(),
        });
        Ok(node)
    }

    pub fn get(&self, graph: &PropertyGraph, index: usize, cursor: &mut Option<Cursor>) -> StoreResult<Id> {
        let node = self.node_at(graph, index, cursor)?;
        self.value(graph, &node)
    }

    /// Insert a value node for `target` at `index` (`None` appends).
    pub fn insert(
        &self,
        graph: &mut PropertyGraph,
        index: Option<usize>,
        target: &Id,
        cursor: &mut Option<Cursor>,
    ) -> StoreResult<()> {
        let size = self.size(graph)?;
        let index = index.unwrap_or(size);
        if index > size {
            return Err(StoreError::OutOfRange { index, size });
        }

        let node = Id::generate();
        graph.add_node(node.clone());
        graph.add_edge(&node, target, &self.value_label)?;

        if size == 0 {
            self.set_pointer(graph, HEAD, Some(&node))?;
            self.set_pointer(graph, TAIL, Some(&node))?;
        } else if index == 0 {
            let head = self
                .pointer(graph, HEAD)
                .ok_or_else(|| StoreError::inconsistent(&self.base, "non-empty list without head"))?;
            graph.add_edge(&node, &head, NEXT)?;
            self.set_pointer(graph, HEAD, Some(&node))?;
        } else if index == size {
            let tail = self
                .pointer(graph, TAIL)
                .ok_or_else(|| StoreError::inconsistent(&self.base, "non-empty list without tail"))?;
            graph.add_edge(&tail, &node, NEXT)?;
            self.set_pointer(graph, TAIL, Some(&node))?;
        } else {
            let current = self.node_at(graph, index, cursor)?;
            let prev = self.step(graph, &current, false)?;
            for edge in graph.edges(&prev, Direction::Out, NEXT) {
                graph.remove_edge(edge);
            }
            graph.add_edge(&prev, &node, NEXT)?;
            graph.add_edge(&node, &current, NEXT)?;
        }
        *cursor = None;
        self.set_size(graph, size + 1)
    }

    /// Point the node at `index` to `target`, returning the former value.
    pub fn replace(
        &self,
        graph: &mut PropertyGraph,
        index: usize,
        target: &Id,
        cursor: &mut Option<Cursor>,
    ) -> StoreResult<Id> {
        let node = self.node_at(graph, index, cursor)?;
        let old = self.value(graph, &node)?;
        graph.remove_edges(&node, Direction::Out, &self.value_label);
        graph.add_edge(&node, target, &self.value_label)?;
        Ok(old)
    }

    /// Unlink and delete the node at `index`, returning its value.
    pub fn remove(&self, graph: &mut PropertyGraph, index: usize, cursor: &mut Option<Cursor>) -> StoreResult<Id> {
        let size = self.size(graph)?;
        let node = self.node_at(graph, index, cursor)?;
        let value = self.value(graph, &node)?;
        let prev = Self::prev(graph, &node);
        let next = Self::next(graph, &node);

        graph.remove_node(&node);
        match (&prev, &next) {
            (Some(p), Some(n)) => {
                graph.add_edge(p, n, NEXT)?;
            }
            (None, _) => self.set_pointer(graph, HEAD, next.as_ref())?,
            (Some(_), None) => {}
        }
        if next.is_none() {
            self.set_pointer(graph, TAIL, prev.as_ref())?;
        }
        *cursor = None;
        self.set_size(graph, size - 1)?;
        Ok(value)
    }

    /// Chain nodes from head to tail.
    fn nodes(&self, graph: &PropertyGraph) -> StoreResult<Vec<Id>> {
        let size = self.size(graph)?;
        let mut nodes = Vec::with_capacity(size);
        let mut current = self.pointer(graph, HEAD);
        while let Some(node) = current {
            if nodes.len() == size {
                return Err(StoreError::inconsistent(&self.base, "list chain longer than its size"));
            }
            current = Self::next(graph, &node);
            nodes.push(node);
        }
        if nodes.len() != size {
            return Err(StoreError::inconsistent(&self.base, "list chain shorter than its size"));
        }
        Ok(nodes)
    }

    /// Values from head to tail.
    pub fn targets(&self, graph: &PropertyGraph) -> StoreResult<Vec<Id>> {
        self.nodes(graph)?
            .iter()
            .map(|n| self.value(graph, n))
            .collect()
    }

    pub fn index_of(&self, graph: &PropertyGraph, target: &Id) -> StoreResult<Option<usize>> {
        let size = self.size(graph)?;
        let mut current = self.pointer(graph, HEAD);
        let mut index = 0;
        while let Some(node) = current {
            if index >= size {
                return Err(StoreError::inconsistent(&self.base, "list chain longer than its size"));
            }
            if &self.value(graph, &node)? == target {
                return Ok(Some(index));
            }
            current = Self::next(graph, &node);
            index += 1;
        }
        if index < size {
            return Err(StoreError::inconsistent(&self.base, "list chain shorter than its size"));
        }
        Ok(None)
    }

    pub fn last_index_of(&self, graph: &PropertyGraph, target: &Id) -> StoreResult<Option<usize>> {
        let size = self.size(graph)?;
        let mut current = self.pointer(graph, TAIL);
        let mut index = size;
        while let Some(node) = current {
            index = index
                .checked_sub(1)
                .ok_or_else(|| StoreError::inconsistent(&self.base, "list chain longer than its size"))?;
            if &self.value(graph, &node)? == target {
                return Ok(Some(index));
            }
            current = Self::prev(graph, &node);
        }
        if index > 0 {
            return Err(StoreError::inconsistent(&self.base, "list chain shorter than its size"));
        }
        Ok(None)
    }

    /// Whether `target` is a value of this list.
    ///
    /// Starts from the value nodes pointing at `target` and follows each
    /// chain forward; membership holds when a chain ends at this list's
    /// tail. Candidates may belong to other owners' lists of the same
    /// feature, so chains are not bounded by this list's size.
    pub fn contains(&self, graph: &PropertyGraph, target: &Id) -> StoreResult<bool> {
        let Some(tail) = self.pointer(graph, TAIL) else {
            if self.size(graph)? > 0 {
                return Err(StoreError::inconsistent(&self.base, "non-empty list without tail"));
            }
            return Ok(false);
        };
        for candidate in graph.neighbors(target, Direction::In, &self.value_label) {
            let mut visited = HashSet::new();
            let mut node = candidate;
            while let Some(next) = Self::next(graph, &node) {
                if !visited.insert(node.clone()) {
                    return Err(StoreError::inconsistent(&node, "cycle in list chain"));
                }
                node = next;
            }
            if node == tail {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete every node, leaving an empty list. Returns the former values.
    pub fn clear(&self, graph: &mut PropertyGraph) -> StoreResult<Vec<Id>> {
        let nodes = self.nodes(graph)?;
        let mut values = Vec::with_capacity(nodes.len());
        for node in &nodes {
            values.push(self.value(graph, node)?);
            graph.remove_node(node);
        }
        self.set_pointer(graph, HEAD, None)?;
        self.set_pointer(graph, TAIL, None)?;
        self.set_size(graph, 0)?;
        Ok(values)
    }

    /// Delete the list entirely, base included.
    pub fn delete(self, graph: &mut PropertyGraph) -> StoreResult<Vec<Id>> {
        let values = self.clear(graph)?;
        graph.remove_node(&self.base);
        Ok(values)
    }
}
