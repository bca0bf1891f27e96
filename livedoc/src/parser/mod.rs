pub mod error;
mod processors;
mod schema;
mod structural;

pub use error::ParseError;
pub(crate) use structural::INDENT_WIDTH;

use tracing::{debug, warn};

use crate::Parsed;
use crate::directive::{Directive, DirectiveKind};
use crate::graph::Graph;
use crate::node::Node;
use crate::parser::structural::{BlockKind, RawBlock};

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the source into a document graph.
    ///
    /// Never fails: directives whose parameters do not validate are kept with
    /// empty params, and the failure is returned as a diagnostic.
    pub fn parse(&self) -> Parsed {
        let (blocks, stray) = structural::split_blocks(&self.source);
        let mut graph = Graph::new();
        let mut diagnostics = Vec::new();

        for block in blocks {
            match block.kind {
                BlockKind::Content { level, title, id } => {
                    graph.push(Node::content(title, level, id, block.text));
                }
                BlockKind::Directive { ref name, level } => {
                    let params = match shape_directive(name, &block) {
                        Ok(directive) => Some(directive),
                        Err(message) => {
                            warn!(directive = %name, %message, "invalid directive parameters");
                            diagnostics.push(
                                ParseError::error(message, block.span.clone(), self.file_id)
                                    .with_note(block.text.clone()),
                            );
                            None
                        }
                    };
                    graph.push(Node::directive(name.clone(), level, block.text, params));
                }
            }
        }

        for text in stray {
            warn!(offset = text.span.start, "discarding text outside any block");
            diagnostics.push(ParseError::warning(
                "text after a directive body is not part of any block",
                text.span,
                self.file_id,
            ));
        }

        debug!(nodes = graph.len(), diagnostics = diagnostics.len(), "parsed document");
        Parsed {
            graph,
            diagnostics,
            source_id: self.file_id,
        }
    }
}

fn shape_directive(name: &str, block: &RawBlock) -> Result<Directive, String> {
    let kind: DirectiveKind = name
        .parse()
        .map_err(|name| format!("unknown directive '@{}'", name))?;
    let body = block.text.split_once('\n').map(|(_, body)| body).unwrap_or("");
    let fields = schema::validate(kind, body)?;
    processors::shape(kind, &fields).map_err(|e| format!("{}: {}", kind, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{BlockRef, BlockSelection, Header, Mode, Prompt};
    use crate::node::NodeKind;
    use codespan_reporting::diagnostic::Severity;

    fn parse(source: &str) -> Parsed {
        Parser::new(source.to_string(), 0).parse()
    }

    fn params(parsed: &Parsed, index: usize) -> Directive {
        parsed.graph.iter().nth(index).unwrap().params.clone().unwrap()
    }

    #[test]
    fn import_with_embedded_block() {
        let parsed = parse("@import\nfile: docs/guide.md/setup/*\nmode: replace\nto: target\n");
        assert!(parsed.diagnostics.is_empty());
        let Directive::Import(p) = params(&parsed, 0) else {
            panic!("expected import");
        };
        assert_eq!(p.source.file.relative(), "docs/guide.md");
        assert_eq!(p.source_block(), Some(&BlockRef::new("setup", true)));
        assert_eq!(p.mode, Some(Mode::Replace));
        assert_eq!(p.to, Some(BlockRef::new("target", false)));
    }

    #[test]
    fn explicit_block_wins_over_embedded() {
        let parsed = parse("@import\nfile: guide.md/setup\nblock: usage/*\n");
        let Directive::Import(p) = params(&parsed, 0) else {
            panic!("expected import");
        };
        assert_eq!(p.source_block(), Some(&BlockRef::new("usage", true)));
    }

    #[test]
    fn llm_with_block_collection() {
        let parsed = parse(
            "# Context {id=ctx}\nfacts\n\n@llm\nprompt: Summarise\nblock:\n  - ctx\n  - notes/*\nuse-header: \"# Summary {id=summary}\"\nprovider: local\n",
        );
        let Directive::Llm(p) = params(&parsed, 1) else {
            panic!("expected llm");
        };
        assert_eq!(p.prompt.as_deref(), Some("Summarise"));
        let block = p.block.unwrap();
        assert!(block.is_multi());
        assert_eq!(block.refs()[1], BlockRef::new("notes", true));
        assert_eq!(p.header, Header::Custom("# Summary {id=summary}".into()));
        assert_eq!(p.provider.as_deref(), Some("local"));
    }

    #[test]
    fn run_prompt_is_classified() {
        let parsed = parse("@run\nfile: agents/sum.md\nprompt: input-block/*\nuse-header: none\n");
        let Directive::Run(p) = params(&parsed, 0) else {
            panic!("expected run");
        };
        assert_eq!(p.file.folder, "agents");
        assert_eq!(p.prompt, Some(Prompt::Block(BlockRef::new("input-block", true))));
        assert_eq!(p.header, Header::Suppressed);
        assert_eq!(p.block, None::<BlockSelection>);
    }

    #[test]
    fn block_scalar_prompt_survives() {
        let parsed = parse("@shell\nprompt: |\n  echo one\n  echo two\n");
        let Directive::Shell(p) = params(&parsed, 0) else {
            panic!("expected shell");
        };
        assert_eq!(p.command.trim_end(), "echo one\necho two");
    }

    #[test]
    fn invalid_directive_keeps_node_without_params() {
        let parsed = parse("# A {id=a}\n\n@goto\nblock: a/*\n\n@teleport\nto: a\n");
        let nodes: Vec<_> = parsed.graph.iter().collect();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].kind, NodeKind::Directive);
        assert!(nodes[1].params.is_none());
        assert!(nodes[2].params.is_none());
        assert_eq!(parsed.diagnostics.len(), 2);
        assert!(parsed.diagnostics[1].message.contains("unknown directive '@teleport'"));
        assert_eq!(parsed.diagnostics[0].notes, ["@goto\nblock: a/*"]);
        assert_eq!(parsed.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn stray_text_is_a_warning() {
        let parsed = parse("@goto\nblock: a\n\nleft over\n\n# A {id=a}\n");
        assert_eq!(parsed.graph.len(), 2);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn content_keeps_header_line() {
        let parsed = parse("# Title {id=t}\nline one\nline two\n");
        let node = parsed.graph.first().unwrap();
        assert_eq!(node.content, "# Title {id=t}\nline one\nline two");
        assert_eq!(node.body(), "line one\nline two");
        assert_eq!(node.name, "Title");
    }
}
