use std::collections::HashMap;
use std::path::{Path, PathBuf};

use livedoc::parser::{ParseError, Parser};
use livedoc::{Graph, RenderStyle, render};
use tracing::info;

use crate::call_tree::{CallTree, RecordId};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::frame::{Frame, Step};
use crate::services::Services;

/// How a nested frame was started.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Source text of the invoking directive.
    pub operation_src: Option<String>,
    pub parent: Option<RecordId>,
}

/// Parse diagnostics collected for one loaded document.
#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    pub path: PathBuf,
    pub source: String,
    pub errors: Vec<ParseError>,
}

/// Runs documents as frames and owns everything shared between frames: the
/// configuration, the collaborators, and the call tree.
pub struct Interpreter {
    pub(crate) config: Config,
    pub(crate) services: Services,
    call_tree: CallTree,
    /// History handle of every document already recorded at frame start.
    started: HashMap<PathBuf, Option<String>>,
    diagnostics: Vec<FileDiagnostics>,
    /// Folder of the first document run; call-tree paths are relative to it.
    base_dir: Option<PathBuf>,
}

impl Interpreter {
    pub fn new(config: Config, services: Services) -> Self {
        Interpreter {
            config,
            services,
            call_tree: CallTree::new(),
            started: HashMap::new(),
            diagnostics: Vec::new(),
            base_dir: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn call_tree(&self) -> &CallTree {
        &self.call_tree
    }

    /// Diagnostics of every loaded document that had any. A diagnostic's
    /// `file_id` is the index of its entry here.
    pub fn diagnostics(&self) -> &[FileDiagnostics] {
        &self.diagnostics
    }

    /// Execute the document at `path` as a top-level frame, with `input`
    /// placed ahead of its first node. Returns the frame result.
    pub fn run_file(&mut self, path: &Path, input: Option<Graph>) -> Result<Graph, RuntimeError> {
        if self.base_dir.is_none() {
            self.base_dir = Some(path.parent().map(Path::to_path_buf).unwrap_or_default());
        }
        self.run_frame(path, input, Invocation::default())
    }

    pub(crate) fn run_frame(
        &mut self,
        path: &Path,
        input: Option<Graph>,
        invocation: Invocation,
    ) -> Result<Graph, RuntimeError> {
        self.execute_frame(path, input, invocation)
            .map_err(|e| RuntimeError::InFile {
                file: self.display_name(path),
                source: Box::new(e),
            })
    }

    fn execute_frame(
        &mut self,
        path: &Path,
        input: Option<Graph>,
        invocation: Invocation,
    ) -> Result<Graph, RuntimeError> {
        let source = self
            .services
            .loader
            .load_document(path)
            .map_err(|e| RuntimeError::io(path, e))?;
        let parsed = Parser::new(source.clone(), self.diagnostics.len()).parse();
        if !parsed.diagnostics.is_empty() {
            self.diagnostics.push(FileDiagnostics {
                path: path.to_path_buf(),
                source,
                errors: parsed.diagnostics,
            });
        }

        let file = self.display_name(path);
        let record = self
            .call_tree
            .open(file.clone(), invocation.operation_src, invocation.parent);
        let md_commit = self.record_start(path)?;
        if let Some(entry) = self.call_tree.get_mut(record) {
            entry.md_commit = md_commit;
        }

        let mut frame = Frame::new(path, parsed.graph).with_input(input)?;
        frame.record = Some(record);
        info!(file = %file, nodes = frame.graph().len(), "frame start");

        let outcome = frame.run_to_end(self)?;
        self.finish_frame(frame, outcome, record)
    }

    /// Record the document in history the first time any frame runs it.
    fn record_start(&mut self, path: &Path) -> Result<Option<String>, RuntimeError> {
        if let Some(handle) = self.started.get(path) {
            return Ok(handle.clone());
        }
        let handle = self
            .services
            .history
            .record_history(&[path.to_path_buf()], "execution start")
            .map_err(RuntimeError::History)?;
        self.started.insert(path.to_path_buf(), handle.clone());
        Ok(handle)
    }

    /// Write the context file, record history, and hand back the result.
    fn finish_frame(&mut self, frame: Frame, outcome: Step, record: RecordId) -> Result<Graph, RuntimeError> {
        let ctx_path = frame.path().with_extension("ctx");
        let rendered = render(frame.graph(), RenderStyle::Flat);
        self.services
            .context
            .write_file(&ctx_path, &rendered)
            .map_err(|e| RuntimeError::io(&ctx_path, e))?;

        let message = match outcome {
            Step::Returned => "@return operation",
            _ => "Final processed files",
        };
        let ctx_commit = self
            .services
            .history
            .record_history(&[frame.path().to_path_buf(), ctx_path.clone()], message)
            .map_err(RuntimeError::History)?;

        let ctx_file = self.display_name(&ctx_path);
        if let Some(entry) = self.call_tree.get_mut(record) {
            entry.ctx_file = Some(ctx_file);
            entry.ctx_commit = ctx_commit;
        }
        info!(file = %frame.path().display(), ?outcome, "frame end");
        Ok(frame.into_result())
    }

    fn display_name(&self, path: &Path) -> String {
        self.base_dir
            .as_deref()
            .and_then(|base| path.strip_prefix(base).ok())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
