//! Narrow interfaces to everything outside the document graph.

use std::fs;
use std::path::{Path, PathBuf};

/// What the engine sends to a text generation backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionRequest {
    pub prompt: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Media files, already resolved against the document folder.
    pub media: Vec<PathBuf>,
}

pub trait TextCompletion {
    fn complete_text(&mut self, request: &CompletionRequest) -> Result<String, String>;
}

pub trait CommandRunner {
    /// Run `command` and return its combined output.
    fn run_command(&mut self, command: &str) -> Result<String, String>;
}

pub trait DocumentLoader {
    fn load_document(&mut self, path: &Path) -> std::io::Result<String>;
}

/// Receives rendered context files and other engine output files.
pub trait ContextSink {
    fn write_file(&mut self, path: &Path, contents: &str) -> std::io::Result<()>;
}

/// Version-control style history, appended at frame boundaries only.
pub trait History {
    /// Record `files` under `message`, returning a handle for the call tree.
    fn record_history(&mut self, files: &[PathBuf], message: &str) -> Result<Option<String>, String>;
}

/// All collaborators one interpreter talks to.
pub struct Services {
    pub completion: Box<dyn TextCompletion>,
    pub commands: Box<dyn CommandRunner>,
    pub loader: Box<dyn DocumentLoader>,
    pub context: Box<dyn ContextSink>,
    pub history: Box<dyn History>,
}

impl Services {
    /// Filesystem-backed loading and output with no history.
    pub fn filesystem(completion: Box<dyn TextCompletion>, commands: Box<dyn CommandRunner>) -> Self {
        Services {
            completion,
            commands,
            loader: Box::new(FsLoader),
            context: Box::new(FsContextSink),
            history: Box::new(NoHistory),
        }
    }
}

pub struct FsLoader;

impl DocumentLoader for FsLoader {
    fn load_document(&mut self, path: &Path) -> std::io::Result<String> {
        fs::read_to_string(path)
    }
}

pub struct FsContextSink;

impl ContextSink for FsContextSink {
    fn write_file(&mut self, path: &Path, contents: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }
}

pub struct NoHistory;

impl History for NoHistory {
    fn record_history(&mut self, _files: &[PathBuf], _message: &str) -> Result<Option<String>, String> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_sink_creates_folders() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.ctx");
        FsContextSink.write_file(&target, "# A\n").unwrap();
        assert_eq!(FsLoader.load_document(&target).unwrap(), "# A\n");
    }
}
