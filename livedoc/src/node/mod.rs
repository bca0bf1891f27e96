pub mod key;

pub use key::NodeKey;

use crate::directive::{Directive, DirectiveKind};

/// Whether a node is document content or a control directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Content,
    Directive,
}

/// One block of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Plain heading text for content, directive name (`import`, `llm`, ...) for directives.
    pub name: String,
    /// Heading depth for content (0 = untitled preamble), indentation depth for directives.
    pub level: usize,
    /// Author-assigned `{id=...}`.
    pub id: Option<String>,
    /// Engine-assigned identity; all linkage goes through it.
    pub key: NodeKey,
    /// Raw text, header line included for content nodes.
    pub content: String,
    /// Shaped parameters. `None` for content, and for directives whose
    /// parameters failed validation.
    pub params: Option<Directive>,
}

impl Node {
    pub fn content(name: impl Into<String>, level: usize, id: Option<String>, content: impl Into<String>) -> Self {
        Node {
            kind: NodeKind::Content,
            name: name.into(),
            level,
            id,
            key: NodeKey::fresh(),
            content: content.into(),
            params: None,
        }
    }

    pub fn directive(
        name: impl Into<String>,
        level: usize,
        content: impl Into<String>,
        params: Option<Directive>,
    ) -> Self {
        Node {
            kind: NodeKind::Directive,
            name: name.into(),
            level,
            id: None,
            key: NodeKey::fresh(),
            content: content.into(),
            params,
        }
    }

    pub fn is_directive(&self) -> bool {
        self.kind == NodeKind::Directive
    }

    /// The closed directive tag, if this is a directive with a known name.
    pub fn directive_kind(&self) -> Option<DirectiveKind> {
        if self.is_directive() {
            self.name.parse().ok()
        } else {
            None
        }
    }

    /// A copy of this node carrying a new key.
    pub fn duplicate(&self) -> Self {
        Node {
            key: NodeKey::fresh(),
            ..self.clone()
        }
    }

    /// Content without its first (header) line.
    pub fn body(&self) -> &str {
        match self.kind {
            NodeKind::Content if self.level > 0 => {
                self.content.split_once('\n').map(|(_, rest)| rest.trim()).unwrap_or("")
            }
            _ => self.content.trim(),
        }
    }
}
