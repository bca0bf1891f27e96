use std::path::PathBuf;

use livedoc::GraphError;
use livedoc::directive::DirectiveKind;
use thiserror::Error;

/// Failures that stop a frame. They propagate through every enclosing `run`
/// frame up to the caller of [`crate::Interpreter::run_file`].
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("unknown directive '@{0}'")]
    UnknownDirective(String),

    #[error("{0} has no valid parameters")]
    MissingParams(DirectiveKind),

    #[error("@goto limit of {limit} exceeded for block '{block}'")]
    LoopLimitExceeded { block: String, limit: usize },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("cannot access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("text completion failed: {0}")]
    Completion(String),

    #[error("shell command failed: {0}")]
    Command(String),

    #[error("history recording failed: {0}")]
    History(String),

    #[error("in {file}: {source}")]
    InFile {
        file: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// The innermost error, with every `InFile` layer removed.
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::InFile { source, .. } => source.root(),
            other => other,
        }
    }

    /// Files the error passed through, outermost first.
    pub fn file_chain(&self) -> Vec<&str> {
        let mut files = Vec::new();
        let mut current = self;
        while let RuntimeError::InFile { file, source } = current {
            files.push(file.as_str());
            current = &**source;
        }
        files
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuntimeError::Io {
            path: path.into(),
            source,
        }
    }
}
