use thiserror::Error;

use crate::node::NodeKey;

/// Failures of graph addressing and structural edits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node with key '{0}' not found")]
    KeyNotFound(NodeKey),

    #[error("block '{0}' not found")]
    BlockNotFound(String),

    #[error("block path cannot be empty")]
    EmptyPath,

    #[error("unknown mode '{0}' (expected append, prepend or replace)")]
    UnknownMode(String),

    #[error("source region is empty for '{0}'")]
    EmptySource(String),

    #[error("no destination nodes found for '{0}'")]
    EmptyDestination(String),

    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
