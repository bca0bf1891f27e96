use crate::graph::Graph;
use crate::parser::INDENT_WIDTH;

/// Layout used when writing a graph back out as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStyle {
    /// Headings and text at column zero, directives indented by their
    /// level, one blank line between nodes.
    #[default]
    Flat,
    /// Every line indented by one step per level below the top.
    Outline,
}

/// Write every node's content in sequence order.
pub fn render(graph: &Graph, style: RenderStyle) -> String {
    let mut out = String::new();
    for node in graph.iter() {
        let pad = match style {
            RenderStyle::Flat if !node.is_directive() => 0,
            _ => node.level.saturating_sub(1) * INDENT_WIDTH,
        };
        for line in node.content.lines() {
            if !line.is_empty() {
                out.extend(std::iter::repeat_n(' ', pad));
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Concatenated content of the graph's nodes, separated by blank lines.
///
/// This is the text handed to collaborators and returned to callers, as
/// opposed to [`render`] output written to context files.
pub fn text_of(graph: &Graph) -> String {
    graph
        .iter()
        .map(|n| n.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::parse_graph;

    const DOC: &str = "intro text\n\n# Top {id=top}\nbody\n\n@llm\nprompt: Say hi\n\n## Child {id=child}\n\n    @goto\n    block: top\n\n### Leaf {id=leaf}\nleaf body\n\n# Tail\n";

    fn shape(graph: &Graph) -> Vec<(NodeKind, usize, Option<String>)> {
        graph.iter().map(|n| (n.kind, n.level, n.id.clone())).collect()
    }

    #[test]
    fn outline_round_trip_preserves_structure() {
        let graph = parse_graph(DOC);
        let rendered = render(&graph, RenderStyle::Outline);
        let reparsed = parse_graph(&rendered);
        assert_eq!(shape(&graph), shape(&reparsed));
        let contents = |g: &Graph| g.iter().map(|n| n.content.clone()).collect::<Vec<_>>();
        assert_eq!(contents(&graph), contents(&reparsed));
    }

    #[test]
    fn flat_round_trip_preserves_structure() {
        let doc = "# A {id=a}\ntext\n\n@shell\nprompt: ls\n\n## B {id=b}\n\n@return\nblock: b\n";
        let graph = parse_graph(doc);
        let reparsed = parse_graph(&render(&graph, RenderStyle::Flat));
        assert_eq!(shape(&graph), shape(&reparsed));
    }

    #[test]
    fn flat_round_trip_keeps_indented_directive_level() {
        let doc = "# A {id=a}\n\n## B {id=b}\n\n        @goto\n        block: a\n\n## C\n";
        let graph = parse_graph(doc);
        let rendered = render(&graph, RenderStyle::Flat);
        assert!(rendered.contains("\n        @goto\n        block: a\n"));
        let reparsed = parse_graph(&rendered);
        assert_eq!(shape(&graph), shape(&reparsed));
        assert_eq!(reparsed.iter().nth(2).unwrap().level, 3);
    }

    #[test]
    fn flat_round_trip_of_full_document() {
        let graph = parse_graph(DOC);
        let reparsed = parse_graph(&render(&graph, RenderStyle::Flat));
        assert_eq!(shape(&graph), shape(&reparsed));
    }

    #[test]
    fn outline_indents_by_level() {
        let graph = parse_graph("# A\n\n## B\nline\n");
        assert_eq!(render(&graph, RenderStyle::Outline), "# A\n\n    ## B\n    line\n\n");
        assert_eq!(render(&graph, RenderStyle::Flat), "# A\n\n## B\nline\n\n");
    }

    #[test]
    fn text_joins_nodes() {
        let graph = parse_graph("# A\none\n\n# B\ntwo\n");
        assert_eq!(text_of(&graph), "# A\none\n\n# B\ntwo");
    }
}
