pub mod reference;

use std::fmt;
use std::str::FromStr;

pub use reference::{BlockRef, BlockSelection, FileRef, Prompt, SourcePath};

use crate::error::GraphError;

/// The closed set of directives the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Import,
    Llm,
    Run,
    Shell,
    Return,
    Goto,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 6] = [
        DirectiveKind::Import,
        DirectiveKind::Llm,
        DirectiveKind::Run,
        DirectiveKind::Shell,
        DirectiveKind::Return,
        DirectiveKind::Goto,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DirectiveKind::Import => "import",
            DirectiveKind::Llm => "llm",
            DirectiveKind::Run => "run",
            DirectiveKind::Shell => "shell",
            DirectiveKind::Return => "return",
            DirectiveKind::Goto => "goto",
        }
    }
}

impl FromStr for DirectiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DirectiveKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name())
    }
}

/// How a source region is committed at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Replace,
    Prepend,
    #[default]
    Append,
}

impl FromStr for Mode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Mode::Replace),
            "prepend" => Ok(Mode::Prepend),
            "append" => Ok(Mode::Append),
            other => Err(GraphError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Replace => write!(f, "replace"),
            Mode::Prepend => write!(f, "prepend"),
            Mode::Append => write!(f, "append"),
        }
    }
}

/// Header placed above generated content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Header {
    #[default]
    Default,
    Custom(String),
    /// `use-header: none` (case-insensitive).
    Suppressed,
}

impl Header {
    pub fn from_use_header(value: Option<String>) -> Self {
        match value {
            None => Header::Default,
            Some(v) if v.trim().eq_ignore_ascii_case("none") => Header::Suppressed,
            Some(v) => Header::Custom(v),
        }
    }

    /// Prefix `body` with this header, `default` standing in for [`Header::Default`].
    pub fn wrap(&self, default: &str, body: &str) -> String {
        match self {
            Header::Default => format!("{}\n{}", default, body),
            Header::Custom(h) => format!("{}\n{}", h.trim_end(), body),
            Header::Suppressed => body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportParams {
    pub source: SourcePath,
    /// Explicit `block:`; takes precedence over a block embedded in `file:`.
    pub block: Option<BlockRef>,
    pub mode: Option<Mode>,
    pub to: Option<BlockRef>,
}

impl ImportParams {
    pub fn source_block(&self) -> Option<&BlockRef> {
        self.block.as_ref().or(self.source.block.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmParams {
    pub prompt: Option<String>,
    pub block: Option<BlockSelection>,
    pub media: Vec<FileRef>,
    pub save_to_file: Option<FileRef>,
    pub header: Header,
    pub mode: Option<Mode>,
    pub to: Option<BlockRef>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub file: FileRef,
    pub prompt: Option<Prompt>,
    pub block: Option<BlockSelection>,
    pub header: Header,
    pub mode: Option<Mode>,
    pub to: Option<BlockRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellParams {
    pub command: String,
    pub header: Header,
    pub mode: Option<Mode>,
    pub to: Option<BlockRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnParams {
    pub prompt: Option<String>,
    pub block: Option<BlockSelection>,
    pub header: Header,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GotoParams {
    /// Target id; nested markers are rejected at parse time.
    pub block: String,
}

/// Validated, shaped parameters of one directive node.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Import(ImportParams),
    Llm(LlmParams),
    Run(RunParams),
    Shell(ShellParams),
    Return(ReturnParams),
    Goto(GotoParams),
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Import(_) => DirectiveKind::Import,
            Directive::Llm(_) => DirectiveKind::Llm,
            Directive::Run(_) => DirectiveKind::Run,
            Directive::Shell(_) => DirectiveKind::Shell,
            Directive::Return(_) => DirectiveKind::Return,
            Directive::Goto(_) => DirectiveKind::Goto,
        }
    }
}
