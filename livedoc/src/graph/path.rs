use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{Node, NodeKey};

/// Find a node by author id first, falling back to its engine key.
pub fn lookup<'g>(graph: &'g Graph, id_or_key: &str) -> Option<&'g Node> {
    graph.find_by_id(id_or_key).or_else(|| graph.get_by_key(id_or_key))
}

/// Resolve `seg0/seg1/.../segN` to a node key.
///
/// `seg0` is looked up globally (id, then key). Every later segment is
/// matched by scanning forward from the current node for the first node whose
/// id or key equals the segment and whose level is exactly one deeper. Nodes
/// of other depths are passed over, not treated as scope boundaries.
pub fn resolve(graph: &Graph, path: &str) -> GraphResult<NodeKey> {
    let path = path.trim();
    if path.is_empty() {
        return Err(GraphError::EmptyPath);
    }

    let mut segments = path.split('/');
    let first = segments.next().unwrap_or_default();
    let mut current = lookup(graph, first)
        .ok_or_else(|| GraphError::BlockNotFound(first.to_string()))?;

    for segment in segments {
        let wanted = current.level + 1;
        current = graph
            .iter_after(&current.key)
            .find(|n| {
                n.level == wanted && (n.id.as_deref() == Some(segment) || n.key == *segment)
            })
            .ok_or_else(|| {
                GraphError::BlockNotFound(format!("{} (no '{}' at level {})", path, segment, wanted))
            })?;
    }

    Ok(current.key.clone())
}
