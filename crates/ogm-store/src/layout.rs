//! Flat persisted encoding of features on a property graph.
//!
//! - Single-valued attribute `f`: node property `f`.
//! - Many-valued attribute `f`: properties `f:0 .. f:(n-1)` plus `f:size`.
//! - Single-valued reference `f`: one out-edge labeled `f`.
//! - Many-valued reference `f`: out-edges labeled `f`, each carrying a
//!   `position` property, plus `f:size` on the source node.
//!
//! Positions of a many-valued feature are always exactly `0 .. size`.

use ogm_backend::{Direction, EdgeId, PropertyGraph};
use ogm_types::{Id, Value};

use crate::error::{StoreError, StoreResult};

pub const SEPARATOR: &str = ":";
pub const SIZE_SUFFIX: &str = "size";
pub const POSITION: &str = "position";

pub fn size_key(feature: &str) -> String {
    format!("{feature}{SEPARATOR}{SIZE_SUFFIX}")
}

pub fn slot_key(feature: &str, index: usize) -> String {
    format!("{feature}{SEPARATOR}{index}")
}

fn to_usize(id: &Id, key: &str, value: &Value) -> StoreResult<usize> {
    value
        .as_int()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StoreError::inconsistent(id, format!("'{key}' is not a valid count: {value}")))
}

/// `n` as an integer property value.
pub(crate) fn count_value(id: &Id, n: usize) -> StoreResult<Value> {
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| StoreError::inconsistent(id, format!("count {n} does not fit an integer property")))
}

/// Recorded size of a many-valued feature, `None` if never written.
pub fn read_size(graph: &PropertyGraph, id: &Id, feature: &str) -> StoreResult<Option<usize>> {
    let key = size_key(feature);
    graph
        .property(id, &key)
        .map(|v| to_usize(id, &key, v))
        .transpose()
}

pub fn write_size(graph: &mut PropertyGraph, id: &Id, feature: &str, size: usize) -> StoreResult<()> {
    graph.set_property(id, &size_key(feature), count_value(id, size)?)?;
    Ok(())
}

pub(crate) fn check_index(index: usize, size: usize) -> StoreResult<()> {
    if index >= size {
        return Err(StoreError::OutOfRange { index, size });
    }
    Ok(())
}

pub(crate) fn check_insert(index: usize, size: usize) -> StoreResult<()> {
    if index > size {
        return Err(StoreError::OutOfRange { index, size });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Many-valued attributes
// ---------------------------------------------------------------------------

fn slot(graph: &PropertyGraph, id: &Id, feature: &str, index: usize) -> StoreResult<Value> {
    graph
        .property(id, &slot_key(feature, index))
        .cloned()
        .ok_or_else(|| StoreError::inconsistent(id, format!("missing slot {feature}:{index}")))
}

pub fn attribute_at(graph: &PropertyGraph, id: &Id, feature: &str, index: usize) -> StoreResult<Value> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    check_index(index, size)?;
    slot(graph, id, feature, index)
}

pub fn attribute_values(graph: &PropertyGraph, id: &Id, feature: &str) -> StoreResult<Vec<Value>> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    (0..size).map(|i| slot(graph, id, feature, i)).collect()
}

pub fn insert_attribute(
    graph: &mut PropertyGraph,
    id: &Id,
    feature: &str,
    index: Option<usize>,
    value: Value,
) -> StoreResult<()> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    let index = index.unwrap_or(size);
    check_insert(index, size)?;
    for i in (index..size).rev() {
        let moved = slot(graph, id, feature, i)?;
        graph.set_property(id, &slot_key(feature, i + 1), moved)?;
    }
    graph.set_property(id, &slot_key(feature, index), value)?;
    write_size(graph, id, feature, size + 1)
}

pub fn replace_attribute(
    graph: &mut PropertyGraph,
    id: &Id,
    feature: &str,
    index: usize,
    value: Value,
) -> StoreResult<Value> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    check_index(index, size)?;
    let old = slot(graph, id, feature, index)?;
    graph.set_property(id, &slot_key(feature, index), value)?;
    Ok(old)
}

pub fn remove_attribute(graph: &mut PropertyGraph, id: &Id, feature: &str, index: usize) -> StoreResult<Value> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    check_index(index, size)?;
    let old = slot(graph, id, feature, index)?;
    for i in index + 1..size {
        let moved = slot(graph, id, feature, i)?;
        graph.set_property(id, &slot_key(feature, i - 1), moved)?;
    }
    graph.remove_property(id, &slot_key(feature, size - 1));
    write_size(graph, id, feature, size - 1)?;
    Ok(old)
}

/// Drop every slot. With `keep_size` the size is reset to 0, otherwise the
/// size property is removed too.
pub fn clear_attributes(graph: &mut PropertyGraph, id: &Id, feature: &str, keep_size: bool) -> StoreResult<()> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    for i in 0..size {
        graph.remove_property(id, &slot_key(feature, i));
    }
    if keep_size {
        if graph.contains_node(id) {
            write_size(graph, id, feature, 0)?;
        }
    } else {
        graph.remove_property(id, &size_key(feature));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Many-valued references
// ---------------------------------------------------------------------------

fn edge_position(graph: &PropertyGraph, source: &Id, edge: EdgeId) -> StoreResult<usize> {
    let value = graph
        .edge_property(edge, POSITION)
        .ok_or_else(|| StoreError::inconsistent(source, "reference edge without position"))?;
    to_usize(source, POSITION, value)
}

/// `(edge, position)` of every reference edge, in storage order.
fn positioned_edges(graph: &PropertyGraph, id: &Id, feature: &str) -> StoreResult<Vec<(EdgeId, usize)>> {
    graph
        .edges(id, Direction::Out, feature)
        .into_iter()
        .map(|e| Ok((e, edge_position(graph, id, e)?)))
        .collect()
}

fn target_of(graph: &PropertyGraph, source: &Id, edge: EdgeId) -> StoreResult<Id> {
    graph
        .edge(edge)
        .map(|r| r.to.clone())
        .ok_or_else(|| StoreError::inconsistent(source, "dangling reference edge"))
}

fn edge_at(graph: &PropertyGraph, id: &Id, feature: &str, index: usize) -> StoreResult<EdgeId> {
    positioned_edges(graph, id, feature)?
        .into_iter()
        .find(|(_, p)| *p == index)
        .map(|(e, _)| e)
        .ok_or_else(|| StoreError::inconsistent(id, format!("no '{feature}' edge at position {index}")))
}

pub fn reference_at(graph: &PropertyGraph, id: &Id, feature: &str, index: usize) -> StoreResult<Id> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    check_index(index, size)?;
    let edge = edge_at(graph, id, feature, index)?;
    target_of(graph, id, edge)
}

/// Targets ordered by position.
pub fn reference_targets(graph: &PropertyGraph, id: &Id, feature: &str) -> StoreResult<Vec<Id>> {
    let mut edges = positioned_edges(graph, id, feature)?;
    edges.sort_by_key(|(_, p)| *p);
    edges.into_iter().map(|(e, _)| target_of(graph, id, e)).collect()
}

/// Positions at which `target` is referenced, ascending.
pub fn reference_positions(graph: &PropertyGraph, id: &Id, feature: &str, target: &Id) -> StoreResult<Vec<usize>> {
    let mut positions = Vec::new();
    for (edge, position) in positioned_edges(graph, id, feature)? {
        if graph.edge(edge).is_some_and(|r| &r.to == target) {
            positions.push(position);
        }
    }
    positions.sort_unstable();
    Ok(positions)
}

pub fn insert_reference(
    graph: &mut PropertyGraph,
    id: &Id,
    feature: &str,
    index: Option<usize>,
    target: &Id,
) -> StoreResult<()> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    let index = index.unwrap_or(size);
    check_insert(index, size)?;
    if index < size {
        for (edge, position) in positioned_edges(graph, id, feature)? {
            if position >= index {
                graph.set_edge_property(edge, POSITION, count_value(id, position + 1)?)?;
            }
        }
    }
    let edge = graph.add_edge(id, target, feature)?;
    graph.set_edge_property(edge, POSITION, count_value(id, index)?)?;
    write_size(graph, id, feature, size + 1)
}

pub fn replace_reference(
    graph: &mut PropertyGraph,
    id: &Id,
    feature: &str,
    index: usize,
    target: &Id,
) -> StoreResult<Id> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    check_index(index, size)?;
    let edge = edge_at(graph, id, feature, index)?;
    let old = target_of(graph, id, edge)?;
    graph.remove_edge(edge);
    let fresh = graph.add_edge(id, target, feature)?;
    graph.set_edge_property(fresh, POSITION, count_value(id, index)?)?;
    Ok(old)
}

pub fn remove_reference(graph: &mut PropertyGraph, id: &Id, feature: &str, index: usize) -> StoreResult<Id> {
    let size = read_size(graph, id, feature)?.unwrap_or(0);
    check_index(index, size)?;
    let mut removed = None;
    for (edge, position) in positioned_edges(graph, id, feature)? {
        if position == index {
            removed = graph.remove_edge(edge).map(|r| r.to);
        } else if position > index {
            graph.set_edge_property(edge, POSITION, count_value(id, position - 1)?)?;
        }
    }
    let removed =
        removed.ok_or_else(|| StoreError::inconsistent(id, format!("no '{feature}' edge at position {index}")))?;
    write_size(graph, id, feature, size - 1)?;
    Ok(removed)
}

/// Drop every reference edge and return the former targets.
pub fn clear_references(
    graph: &mut PropertyGraph,
    id: &Id,
    feature: &str,
    keep_size: bool,
) -> StoreResult<Vec<Id>> {
    let removed: Vec<Id> = graph
        .remove_edges(id, Direction::Out, feature)
        .into_iter()
        .map(|r| r.to)
        .collect();
    if keep_size {
        if graph.contains_node(id) {
            write_size(graph, id, feature, 0)?;
        }
    } else {
        graph.remove_property(id, &size_key(feature));
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Single-valued references
// ---------------------------------------------------------------------------

pub fn single_reference(graph: &PropertyGraph, id: &Id, feature: &str) -> Option<Id> {
    graph.neighbor(id, Direction::Out, feature)
}

/// Point the single-valued reference at `target`, returning the former
/// target.
pub fn set_single_reference(graph: &mut PropertyGraph, id: &Id, feature: &str, target: &Id) -> StoreResult<Option<Id>> {
    let old = graph
        .remove_edges(id, Direction::Out, feature)
        .into_iter()
        .next()
        .map(|r| r.to);
    graph.add_edge(id, target, feature)?;
    Ok(old)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(ids: &[&str]) -> PropertyGraph {
        let mut g = PropertyGraph::new();
        for i in ids {
            g.add_node(Id::from_raw(i));
        }
        g
    }

    fn id(s: &str) -> Id {
        Id::from_raw(s)
    }

    #[test]
    fn keys_use_separator() {
        assert_eq!(size_key("names"), "names:size");
        assert_eq!(slot_key("names", 3), "names:3");
    }

    #[test]
    fn attribute_insert_shifts_up() {
        let mut g = graph_with(&["e"]);
        insert_attribute(&mut g, &id("e"), "n", None, Value::from("a")).unwrap();
        insert_attribute(&mut g, &id("e"), "n", None, Value::from("c")).unwrap();
        insert_attribute(&mut g, &id("e"), "n", Some(1), Value::from("b")).unwrap();

        let values = attribute_values(&g, &id("e"), "n").unwrap();
        assert_eq!(values, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(read_size(&g, &id("e"), "n").unwrap(), Some(3));
    }

    #[test]
    fn attribute_remove_shifts_down() {
        let mut g = graph_with(&["e"]);
        for v in ["a", "b", "c"] {
            insert_attribute(&mut g, &id("e"), "n", None, Value::from(v)).unwrap();
        }
        let removed = remove_attribute(&mut g, &id("e"), "n", 0).unwrap();
        assert_eq!(removed, Value::from("a"));
        assert_eq!(
            attribute_values(&g, &id("e"), "n").unwrap(),
            vec![Value::from("b"), Value::from("c")]
        );
        assert!(g.property(&id("e"), "n:2").is_none());
    }

    #[test]
    fn insert_past_end_is_out_of_range() {
        let mut g = graph_with(&["e"]);
        let err = insert_attribute(&mut g, &id("e"), "n", Some(1), Value::Int(1)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { index: 1, size: 0 }));
    }

    #[test]
    fn reference_positions_stay_contiguous() {
        let mut g = graph_with(&["s", "a", "b", "c"]);
        insert_reference(&mut g, &id("s"), "r", None, &id("a")).unwrap();
        insert_reference(&mut g, &id("s"), "r", None, &id("c")).unwrap();
        insert_reference(&mut g, &id("s"), "r", Some(1), &id("b")).unwrap();
        assert_eq!(reference_targets(&g, &id("s"), "r").unwrap(), vec![id("a"), id("b"), id("c")]);

        let removed = remove_reference(&mut g, &id("s"), "r", 0).unwrap();
        assert_eq!(removed, id("a"));
        assert_eq!(reference_targets(&g, &id("s"), "r").unwrap(), vec![id("b"), id("c")]);
        assert_eq!(reference_at(&g, &id("s"), "r", 0).unwrap(), id("b"));
        assert_eq!(read_size(&g, &id("s"), "r").unwrap(), Some(2));
    }

    #[test]
    fn remove_at_size_is_out_of_range() {
        let mut g = graph_with(&["s", "a"]);
        insert_reference(&mut g, &id("s"), "r", None, &id("a")).unwrap();
        assert!(matches!(
            remove_reference(&mut g, &id("s"), "r", 1),
            Err(StoreError::OutOfRange { index: 1, size: 1 })
        ));
    }

    #[test]
    fn duplicate_targets_report_all_positions() {
        let mut g = graph_with(&["s", "a", "b"]);
        for t in ["a", "b", "a"] {
            insert_reference(&mut g, &id("s"), "r", None, &id(t)).unwrap();
        }
        assert_eq!(reference_positions(&g, &id("s"), "r", &id("a")).unwrap(), vec![0, 2]);
    }

    #[test]
    fn corrupt_size_is_reported() {
        let mut g = graph_with(&["e"]);
        g.set_property(&id("e"), "n:size", Value::from("three")).unwrap();
        assert!(matches!(
            read_size(&g, &id("e"), "n"),
            Err(StoreError::StructuralInconsistency { .. })
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn count_beyond_integer_range_is_reported() {
        assert_eq!(count_value(&id("e"), 3).unwrap(), Value::Int(3));
        assert!(matches!(
            count_value(&id("e"), usize::MAX),
            Err(StoreError::StructuralInconsistency { .. })
        ));
    }

    #[test]
    fn single_reference_replaces() {
        let mut g = graph_with(&["s", "a", "b"]);
        assert_eq!(set_single_reference(&mut g, &id("s"), "r", &id("a")).unwrap(), None);
        assert_eq!(set_single_reference(&mut g, &id("s"), "r", &id("b")).unwrap(), Some(id("a")));
        assert_eq!(single_reference(&g, &id("s"), "r"), Some(id("b")));
    }
}
