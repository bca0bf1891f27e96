use std::collections::HashMap;
use std::path::{Path, PathBuf};

use livedoc::{Graph, GraphError, NodeKey};
use tracing::debug;

use crate::call_tree::RecordId;
use crate::directives::{self, Flow};
use crate::error::RuntimeError;
use crate::executor::Interpreter;

/// Outcome of executing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The cursor ran off the end of the document.
    Finished,
    /// A `@return` produced the frame result.
    Returned,
}

/// Execution state of one document: its graph, cursor and goto counters.
///
/// Each frame owns its graph; nested `run` frames share nothing with their
/// caller apart from the graph they return.
#[derive(Debug)]
pub struct Frame {
    pub(crate) path: PathBuf,
    pub(crate) graph: Graph,
    pub(crate) cursor: Option<NodeKey>,
    pub(crate) goto_counts: HashMap<NodeKey, usize>,
    pub(crate) record: Option<RecordId>,
    pub(crate) result: Option<Graph>,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>, graph: Graph) -> Self {
        let cursor = graph.head_key().cloned();
        Frame {
            path: path.into(),
            graph,
            cursor,
            goto_counts: HashMap::new(),
            record: None,
            result: None,
        }
    }

    /// Place `input` ahead of the document's first node.
    pub fn with_input(mut self, input: Option<Graph>) -> Result<Self, RuntimeError> {
        let Some(input) = input.filter(|g| !g.is_empty()) else {
            return Ok(self);
        };
        match self.graph.head_key().cloned() {
            Some(head) => self.graph.prepend_with_graph(&head, input)?,
            None => self.graph = input,
        }
        self.cursor = self.graph.head_key().cloned();
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Folder that relative file references resolve against.
    pub fn folder(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn cursor(&self) -> Option<&NodeKey> {
        self.cursor.as_ref()
    }

    pub fn goto_count(&self, key: &NodeKey) -> usize {
        self.goto_counts.get(key).copied().unwrap_or(0)
    }

    pub fn result(&self) -> Option<&Graph> {
        self.result.as_ref()
    }

    /// Execute the node under the cursor and move the cursor on.
    pub fn step(&mut self, interp: &mut Interpreter) -> Result<Step, RuntimeError> {
        if self.result.is_some() {
            return Ok(Step::Returned);
        }
        let Some(key) = self.cursor.clone() else {
            return Ok(Step::Finished);
        };
        let node = self
            .graph
            .get(&key)
            .ok_or_else(|| GraphError::KeyNotFound(key.clone()))?;

        if !node.is_directive() {
            debug!(key = %key, title = %node.name, "content");
            self.cursor = self.graph.next_key(&key).cloned();
            return Ok(Step::Continue);
        }

        let node = node.clone();
        match directives::execute(self, &node, interp)? {
            Flow::Next(cursor) => {
                debug!(from = %key, to = ?cursor.as_ref().map(NodeKey::as_str), "cursor");
                self.cursor = cursor;
                Ok(Step::Continue)
            }
            Flow::Return(result) => {
                self.result = Some(result);
                self.cursor = None;
                Ok(Step::Returned)
            }
        }
    }

    /// Step until the document ends or returns.
    pub fn run_to_end(&mut self, interp: &mut Interpreter) -> Result<Step, RuntimeError> {
        loop {
            match self.step(interp)? {
                Step::Continue => continue,
                done => return Ok(done),
            }
        }
    }

    /// The frame result: the returned graph, or the whole document.
    pub fn into_result(self) -> Graph {
        self.result.unwrap_or(self.graph)
    }
}
