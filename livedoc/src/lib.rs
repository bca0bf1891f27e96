pub mod directive;
pub mod error;
pub mod graph;
pub mod node;
pub mod parser;
pub mod render;

pub use error::GraphError;
pub use graph::Graph;
pub use node::{Node, NodeKey, NodeKind};
pub use render::{RenderStyle, render};

/// A parsed document: its graph plus any non-fatal schema diagnostics.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub graph: Graph,
    pub diagnostics: Vec<parser::ParseError>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Parsed {
    /// Whether any diagnostic is error-severity.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(parser::ParseError::is_error)
    }
}

/// Parse `source` into a graph, dropping diagnostics.
pub fn parse_graph(source: &str) -> Graph {
    parser::Parser::new(source.to_string(), 0).parse().graph
}
