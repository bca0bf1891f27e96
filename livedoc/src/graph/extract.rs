use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, resolve};
use crate::node::NodeKey;

/// Copy `start` (and, when `hierarchical`, its descendants) into a new
/// detached graph. Directive nodes inside the branch are skipped. Copies get
/// fresh keys; the source graph is not touched.
pub fn extract(graph: &Graph, start: &NodeKey, hierarchical: bool) -> GraphResult<Graph> {
    let anchor = graph
        .get(start)
        .ok_or_else(|| GraphError::KeyNotFound(start.clone()))?;

    let mut out = Graph::new();
    out.push(anchor.duplicate());

    if hierarchical {
        for node in graph.iter_after(start).take_while(|n| n.level > anchor.level) {
            if !node.is_directive() {
                out.push(node.duplicate());
            }
        }
    }

    Ok(out)
}

/// Resolve `path` and extract the region it names.
pub fn extract_path(graph: &Graph, path: &str, hierarchical: bool) -> GraphResult<Graph> {
    let key = resolve(graph, path)?;
    let region = extract(graph, &key, hierarchical)?;
    if region.is_empty() {
        return Err(GraphError::EmptySource(path.to_string()));
    }
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeKind;
    use crate::parse_graph;

    const DOC: &str = "# A {id=a}\n\n## B {id=b}\n\n    @goto\n    block: a\n\n### C {id=c}\n\n# D {id=d}\n";

    #[test]
    fn flat_extract_copies_one_node() {
        let graph = parse_graph(DOC);
        let part = extract_path(&graph, "a", false).unwrap();
        assert_eq!(part.len(), 1);
        assert_eq!(part.first().unwrap().id.as_deref(), Some("a"));
    }

    #[test]
    fn hierarchical_extract_skips_directives() {
        let graph = parse_graph(DOC);
        let part = extract_path(&graph, "a", true).unwrap();
        let ids: Vec<_> = part.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, [Some("a".into()), Some("b".into()), Some("c".into())]);
        assert!(part.iter().all(|n| n.kind == NodeKind::Content));
        part.check_invariants().unwrap();
    }

    #[test]
    fn hierarchical_extract_stops_at_directive_of_anchor_level() {
        let graph = parse_graph("# A {id=a}\n\n## B\n\n@goto\nblock: a\n\n## C\n");
        let part = extract_path(&graph, "a", true).unwrap();
        let names: Vec<_> = part.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn copies_are_detached() {
        let graph = parse_graph(DOC);
        let before = graph.len();
        let part = extract_path(&graph, "a", true).unwrap();
        let original = graph.find_by_id("a").unwrap();
        let copy = part.first().unwrap();
        assert_ne!(original.key, copy.key);
        assert_eq!(original.content, copy.content);
        assert_eq!(graph.len(), before);
        assert!(part.first().is_some() && part.last().unwrap().id.as_deref() == Some("c"));
    }

    #[test]
    fn missing_start() {
        let graph = parse_graph(DOC);
        assert!(matches!(
            extract_path(&graph, "a/zzz", true),
            Err(GraphError::BlockNotFound(_))
        ));
    }
}
