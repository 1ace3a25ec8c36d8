//! Containment bookkeeping.
//!
//! An owned element has at most one `eContainer` out-edge, pointing at its
//! owner and carrying the owning feature's name as `containingFeature`.

use ogm_backend::{Direction, PropertyGraph};
use ogm_types::{Id, Value};

use crate::error::StoreResult;

pub const CONTAINER: &str = "eContainer";
pub const CONTAINING_FEATURE: &str = "containingFeature";

/// Feature of the synthetic root listing top-level elements.
pub const ROOT_CONTENTS: &str = "eContents";

/// Make `parent.feature` the sole owner of `child`.
///
/// The edge is left untouched when it already records the same owner and
/// feature, so repeated updates never duplicate it.
pub fn update_containment(graph: &mut PropertyGraph, feature: &str, parent: &Id, child: &Id) -> StoreResult<()> {
    let existing = graph.edges(child, Direction::Out, CONTAINER);
    if let [only] = existing.as_slice() {
        let same_parent = graph.edge(*only).is_some_and(|e| &e.to == parent);
        let same_feature = graph
            .edge_property(*only, CONTAINING_FEATURE)
            .and_then(|v| v.as_text())
            == Some(feature);
        if same_parent && same_feature {
            return Ok(());
        }
    }
    for edge in existing {
        graph.remove_edge(edge);
    }
    let edge = graph.add_edge(child, parent, CONTAINER)?;
    graph.set_edge_property(edge, CONTAINING_FEATURE, Value::from(feature))?;
    Ok(())
}

/// Drop the owner edge of `child`.
pub fn remove_containment(graph: &mut PropertyGraph, child: &Id) {
    graph.remove_edges(child, Direction::Out, CONTAINER);
}

/// Drop the owner edge of `child` only if it points at `parent.feature`.
pub fn release_child(graph: &mut PropertyGraph, parent: &Id, feature: &str, child: &Id) {
    if container_of(graph, child).is_some_and(|(p, f)| &p == parent && f.as_deref() == Some(feature)) {
        remove_containment(graph, child);
    }
}

/// Owner of `child` and the owning feature.
pub fn container_of(graph: &PropertyGraph, child: &Id) -> Option<(Id, Option<String>)> {
    let edge = graph.edges(child, Direction::Out, CONTAINER).into_iter().next()?;
    let record = graph.edge(edge)?;
    let feature = graph
        .edge_property(edge, CONTAINING_FEATURE)
        .and_then(|v| v.as_text())
        .map(str::to_string);
    Some((record.to.clone(), feature))
}

/// Whether `id` sits inside a resource: it has an owner, or the root lists
/// it among its contents (directly or through a long-list value node).
pub fn is_in_resource(graph: &PropertyGraph, id: &Id) -> bool {
    if !graph.edges(id, Direction::Out, CONTAINER).is_empty() {
        return true;
    }
    if graph
        .neighbors(id, Direction::In, ROOT_CONTENTS)
        .iter()
        .any(Id::is_root)
    {
        return true;
    }
    let value_label = crate::list::value_label(ROOT_CONTENTS);
    !graph.edges(id, Direction::In, &value_label).is_empty()
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

    #[test]
    fn update_is_idempotent() {
        let mut g = graph_with(&["p", "c"]);
        let (p, c) = (Id::from_raw("p"), Id::from_raw("c"));
        update_containment(&mut g, "children", &p, &c).unwrap();
        update_containment(&mut g, "children", &p, &c).unwrap();
        assert_eq!(g.edges(&c, Direction::Out, CONTAINER).len(), 1);
        assert_eq!(container_of(&g, &c), Some((p, Some("children".into()))));
    }

    #[test]
    fn reparenting_replaces_owner() {
        let mut g = graph_with(&["p", "q", "c"]);
        let (p, q, c) = (Id::from_raw("p"), Id::from_raw("q"), Id::from_raw("c"));
        update_containment(&mut g, "children", &p, &c).unwrap();
        update_containment(&mut g, "members", &q, &c).unwrap();
        assert_eq!(g.edges(&c, Direction::Out, CONTAINER).len(), 1);
        assert_eq!(container_of(&g, &c), Some((q, Some("members".into()))));
    }

    #[test]
    fn release_only_matching_owner() {
        let mut g = graph_with(&["p", "q", "c"]);
        let (p, q, c) = (Id::from_raw("p"), Id::from_raw("q"), Id::from_raw("c"));
        update_containment(&mut g, "children", &p, &c).unwrap();
        release_child(&mut g, &q, "children", &c);
        assert!(container_of(&g, &c).is_some());
        release_child(&mut g, &p, "children", &c);
        assert!(container_of(&g, &c).is_none());
    }

    #[test]
    fn root_contents_count_as_resource() {
        let mut g = graph_with(&["ROOT", "top", "loose"]);
        g.add_edge(&Id::root(), &Id::from_raw("top"), ROOT_CONTENTS).unwrap();
        assert!(is_in_resource(&g, &Id::from_raw("top")));
        assert!(!is_in_resource(&g, &Id::from_raw("loose")));
    }
}
