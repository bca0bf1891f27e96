use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use interpreter::{
    CommandRunner, CompletionRequest, Config, ContextSink, DocumentLoader, Frame, History,
    Interpreter, RuntimeError, Services, Step, TextCompletion,
};
use livedoc::{Graph, GraphError, RenderStyle, parse_graph, render};

/// Everything the fake collaborators saw.
#[derive(Default)]
struct Log {
    requests: Vec<CompletionRequest>,
    commands: Vec<String>,
    writes: Vec<(PathBuf, String)>,
    history: Vec<(Vec<PathBuf>, String)>,
}

type Shared = Rc<RefCell<Log>>;

struct FakeLlm(Shared, String);

impl TextCompletion for FakeLlm {
    fn complete_text(&mut self, request: &CompletionRequest) -> Result<String, String> {
        self.0.borrow_mut().requests.push(request.clone());
        Ok(self.1.clone())
    }
}

struct FakeShell(Shared, String);

impl CommandRunner for FakeShell {
    fn run_command(&mut self, command: &str) -> Result<String, String> {
        self.0.borrow_mut().commands.push(command.to_string());
        Ok(self.1.clone())
    }
}

struct MemLoader(HashMap<PathBuf, String>);

impl DocumentLoader for MemLoader {
    fn load_document(&mut self, path: &Path) -> io::Result<String> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such document"))
    }
}

struct MemSink(Shared);

impl ContextSink for MemSink {
    fn write_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
        self.0
            .borrow_mut()
            .writes
            .push((path.to_path_buf(), contents.to_string()));
        Ok(())
    }
}

struct LogHistory(Shared);

impl History for LogHistory {
    fn record_history(&mut self, files: &[PathBuf], message: &str) -> Result<Option<String>, String> {
        let mut log = self.0.borrow_mut();
        log.history.push((files.to_vec(), message.to_string()));
        Ok(Some(format!("h{}", log.history.len())))
    }
}

fn interpreter_with(docs: &[(&str, &str)], config: Config) -> (Interpreter, Shared) {
    let log = Shared::default();
    let files = docs
        .iter()
        .map(|(path, text)| (PathBuf::from(path), text.to_string()))
        .collect();
    let services = Services {
        completion: Box::new(FakeLlm(log.clone(), "generated text".into())),
        commands: Box::new(FakeShell(log.clone(), "hi\n".into())),
        loader: Box::new(MemLoader(files)),
        context: Box::new(MemSink(log.clone())),
        history: Box::new(LogHistory(log.clone())),
    };
    (Interpreter::new(config, services), log)
}

fn interpreter(docs: &[(&str, &str)]) -> (Interpreter, Shared) {
    interpreter_with(docs, Config::default())
}

/// Run `source` as `main.md` and return the frame result.
fn run(source: &str) -> Result<Graph, RuntimeError> {
    let (mut interp, _) = interpreter(&[("main.md", source)]);
    interp.run_file(Path::new("main.md"), None)
}

fn contents(graph: &Graph) -> Vec<String> {
    graph.iter().map(|n| n.content.clone()).collect()
}

fn names(graph: &Graph) -> Vec<String> {
    graph.iter().map(|n| n.name.clone()).collect()
}

#[test]
fn return_literal_gets_default_header() {
    let result = run("# Start\n\n@return\nprompt: hello\n").unwrap();
    assert_eq!(contents(&result), ["# Return block\nhello"]);
}

#[test]
fn return_literal_header_override_and_suppression() {
    let result = run("@return\nprompt: hello\nuse-header: \"# Done {id=done}\"\n").unwrap();
    assert_eq!(result.first().unwrap().id.as_deref(), Some("done"));

    let result = run("@return\nprompt: hello\nuse-header: None\n").unwrap();
    assert_eq!(contents(&result), ["hello"]);
    assert_eq!(result.first().unwrap().level, 0);
}

#[test]
fn return_block_with_custom_header() {
    let source = "# Notes {id=notes}\nalpha\n\n## Detail\nbeta\n\n# Other\n\n@return\nblock: notes/*\nuse-header: \"# Result\"\n";
    let result = run(source).unwrap();
    assert_eq!(names(&result), ["Result", "Notes", "Detail"]);
}

#[test]
fn return_stops_execution() {
    let (mut interp, log) = interpreter(&[(
        "main.md",
        "@return\nprompt: early\n\n@shell\nprompt: never\n",
    )]);
    interp.run_file(Path::new("main.md"), None).unwrap();
    assert!(log.borrow().commands.is_empty());
}

#[test]
fn end_of_document_returns_whole_graph() {
    let result = run("# A {id=a}\none\n\n# B {id=b}\ntwo\n").unwrap();
    assert_eq!(names(&result), ["A", "B"]);
}

#[test]
fn goto_single_step_moves_cursor_only() {
    let (mut interp, _) = interpreter(&[]);
    let graph = parse_graph("# A {id=a}\ncontent\n\n@goto\nblock: a\n");
    let a = graph.find_by_id("a").unwrap().key.clone();
    let goto = graph.last().unwrap().key.clone();
    let mut frame = Frame::new("main.md", graph);

    assert_eq!(frame.step(&mut interp).unwrap(), Step::Continue);
    assert_eq!(frame.cursor(), Some(&goto));
    assert_eq!(frame.step(&mut interp).unwrap(), Step::Continue);
    assert_eq!(frame.cursor(), Some(&a));
    assert_eq!(frame.goto_count(&a), 1);
    assert_eq!(frame.graph().len(), 2);
    assert_eq!(frame.graph().first().unwrap().content, "# A {id=a}\ncontent");
}

#[test]
fn goto_succeeds_exactly_limit_times() {
    let (mut interp, _) = interpreter(&[]);
    let limit = interp.config().goto_limit;
    let graph = parse_graph("# X {id=x}\n\n@goto\nblock: x\n");
    let x = graph.first().unwrap().key.clone();
    let mut frame = Frame::new("loop.md", graph);

    let mut jumps = 0;
    let err = loop {
        let before = frame.cursor().cloned();
        match frame.step(&mut interp) {
            Ok(_) => {
                if before.as_ref() != Some(&x) && frame.cursor() == Some(&x) {
                    jumps += 1;
                }
            }
            Err(e) => break e,
        }
    };
    assert_eq!(jumps, limit);
    assert!(matches!(err, RuntimeError::LoopLimitExceeded { limit: 8, .. }));
}

#[test]
fn goto_limit_is_configurable() {
    let config = Config {
        goto_limit: 2,
        ..Config::default()
    };
    let (mut interp, _) = interpreter_with(&[("loop.md", "# X {id=x}\n\n@goto\nblock: x\n")], config);
    let err = interp.run_file(Path::new("loop.md"), None).unwrap_err();
    assert_eq!(err.file_chain(), ["loop.md"]);
    assert!(matches!(err.root(), RuntimeError::LoopLimitExceeded { limit: 2, .. }));
}

#[test]
fn goto_requires_an_id() {
    let err = run("# X\n\n@goto\nblock: x\n").unwrap_err();
    assert!(matches!(err.root(), RuntimeError::Graph(GraphError::BlockNotFound(_))));
}

#[test]
fn import_section_after_directive() {
    let lib = "# Lib\n\n## Part {id=part}\npart text\n\n### Sub\nsub text\n\n## Other\n";
    let main = "# Intro {id=intro}\n\n@import\nfile: lib.md/part/*\n\n# End {id=end}\n";
    let (mut interp, _) = interpreter(&[("main.md", main), ("lib.md", lib)]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();
    assert_eq!(names(&result), ["Intro", "import", "Part", "Sub", "End"]);
    result.check_invariants().unwrap();
}

#[test]
fn import_replace_into_target_branch() {
    let lib = "# Fresh {id=fresh}\nnew\n";
    let main = "# Slot {id=slot}\nold\n\n## Old child\n\n# Keep\n\n@import\nfile: lib.md\nmode: replace\nto: slot/*\n";
    let (mut interp, _) = interpreter(&[("main.md", main), ("lib.md", lib)]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();
    assert_eq!(names(&result), ["Fresh", "Keep", "import"]);
}

#[test]
fn import_missing_block_leaves_graph_untouched() {
    let (mut interp, _) = interpreter(&[("lib.md", "# Lib {id=lib}\n")]);
    let graph = parse_graph("# Main {id=main}\n\n@import\nfile: lib.md/nope\n");
    let before = render(&graph, RenderStyle::Flat);
    let mut frame = Frame::new("main.md", graph);

    frame.step(&mut interp).unwrap();
    let err = frame.step(&mut interp).unwrap_err();
    assert!(matches!(err, RuntimeError::Graph(GraphError::BlockNotFound(_))));
    assert_eq!(render(frame.graph(), RenderStyle::Flat), before);
    frame.graph().check_invariants().unwrap();
}

#[test]
fn import_missing_file_is_io_error() {
    let err = run("@import\nfile: absent.md\n").unwrap_err();
    assert!(matches!(err.root(), RuntimeError::Io { .. }));
}

#[test]
fn llm_literal_prompt_uses_preceding_content() {
    let (mut interp, log) = interpreter(&[(
        "main.md",
        "# Facts {id=facts}\nsky is blue\n\n@llm\nprompt: Summarise\n",
    )]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();

    let log = log.borrow();
    assert_eq!(log.requests[0].prompt, "# Facts {id=facts}\nsky is blue\n\nSummarise");
    assert_eq!(
        result.last().unwrap().content,
        "# LLM response block\ngenerated text"
    );
}

#[test]
fn llm_blocks_then_literal_with_overrides() {
    let config = Config {
        default_provider: Some("openai".into()),
        default_model: Some("base-model".into()),
        ..Config::default()
    };
    let main = "# A {id=a}\nfirst\n\n# B {id=b}\nsecond\n\n@llm\nprompt: Compare\nblock:\n  - b\n  - a\nmedia:\n  - img/chart.png\nsave-to-file: out/reply.txt\nmodel: big-model\nuse-header: \"# Answer {id=answer}\"\nmode: replace\nto: a\n";
    let (mut interp, log) = interpreter_with(&[("docs/main.md", main)], config);
    let result = interp.run_file(Path::new("docs/main.md"), None).unwrap();

    let log = log.borrow();
    let request = &log.requests[0];
    assert_eq!(request.prompt, "# B {id=b}\nsecond\n\n# A {id=a}\nfirst\n\nCompare");
    assert_eq!(request.provider.as_deref(), Some("openai"));
    assert_eq!(request.model.as_deref(), Some("big-model"));
    assert_eq!(request.media, [PathBuf::from("docs/img/chart.png")]);
    assert!(
        log.writes
            .contains(&(PathBuf::from("docs/out/reply.txt"), "generated text".to_string()))
    );

    assert_eq!(names(&result), ["Answer", "B", "llm"]);
    assert_eq!(result.first().unwrap().body(), "generated text");
}

#[test]
fn shell_output_is_wrapped_and_quotes_stripped() {
    let (mut interp, log) = interpreter(&[("main.md", "# Run\n\n@shell\nprompt: '\"echo hi\"'\n")]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();
    assert_eq!(log.borrow().commands, ["echo hi"]);
    assert_eq!(
        result.last().unwrap().content,
        "# OS Shell Tool response block\nhi"
    );
}

#[test]
fn shell_prepend_with_suppressed_header() {
    let result = run("# Log {id=log}\n\n@shell\nprompt: ls\nuse-header: none\nmode: prepend\nto: log\n").unwrap();
    assert_eq!(contents(&result)[0], "hi");
    assert_eq!(names(&result)[1], "Log");
}

#[test]
fn shell_unknown_target_fails() {
    let err = run("@shell\nprompt: ls\nto: nowhere\n").unwrap_err();
    assert!(matches!(err.root(), RuntimeError::Graph(GraphError::BlockNotFound(_))));
}

#[test]
fn hierarchical_replace_keeps_sibling_and_resumes() {
    let source = "# A {id=a}\n\n## B\n\n## C\n\n# D {id=d}\n\n@shell\nprompt: ls\nmode: replace\nto: a/*\n\n# E {id=e}\n\n@return\nblock: d\n";
    let (mut interp, log) = interpreter(&[("main.md", source)]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();
    assert_eq!(names(&result), ["D"]);
    // The main graph was rendered to the context file before returning.
    let log = log.borrow();
    let (path, ctx) = log.writes.last().unwrap();
    assert_eq!(path, &PathBuf::from("main.ctx"));
    let rendered = parse_graph(ctx);
    assert_eq!(names(&rendered), ["OS Shell Tool response block", "D", "shell", "E", "return"]);
}

#[test]
fn run_nested_document_with_input() {
    let main = "# Main {id=main}\n\n@run\nfile: agents/child.md\nprompt: Find X\n\n# After {id=after}\n";
    let child = "# Child\n\n@return\nblock: input-parameters\nuse-header: \"# Child result {id=child-result}\"\n";
    let (mut interp, log) = interpreter(&[("main.md", main), ("agents/child.md", child)]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();

    assert_eq!(
        names(&result),
        ["Main", "run", "Child result", "Input Parameters", "After"]
    );
    assert_eq!(
        result.find_by_id("input-parameters").unwrap().body(),
        "Find X"
    );

    let log = log.borrow();
    let messages: Vec<_> = log.history.iter().map(|(_, m)| m.as_str()).collect();
    assert_eq!(
        messages,
        ["execution start", "execution start", "@return operation", "Final processed files"]
    );
    let ctx_files: Vec<_> = log.writes.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(ctx_files, [PathBuf::from("agents/child.ctx"), PathBuf::from("main.ctx")]);

    let tree = interp.call_tree();
    assert_eq!(tree.len(), 2);
    let root = tree.roots().next().unwrap();
    let record = tree.get(root).unwrap();
    assert_eq!(record.file, "main.md");
    assert_eq!(record.md_commit.as_deref(), Some("h1"));
    let child_record = tree.get(record.children[0]).unwrap();
    assert_eq!(child_record.file, "agents/child.md");
    assert_eq!(child_record.ctx_file.as_deref(), Some("agents/child.ctx"));
    assert!(child_record.operation_src.as_deref().unwrap().starts_with("@run"));
}

#[test]
fn run_passes_blocks_and_replaces_target() {
    let main = "# Data {id=data}\n42\n\n# Slot {id=slot}\n\n@run\nfile: child.md\nblock: data\nmode: replace\nto: slot\n";
    let child = "@return\nblock: data\n";
    let (mut interp, _) = interpreter(&[("main.md", main), ("child.md", child)]);
    let result = interp.run_file(Path::new("main.md"), None).unwrap();
    assert_eq!(names(&result), ["Data", "Data", "run"]);
}

#[test]
fn nested_failure_carries_file_chain() {
    let main = "@run\nfile: agents/child.md\n";
    let child = "# Child\n\n@goto\nblock: missing\n";
    let (mut interp, _) = interpreter(&[("main.md", main), ("agents/child.md", child)]);
    let err = interp.run_file(Path::new("main.md"), None).unwrap_err();
    assert_eq!(err.file_chain(), ["main.md", "agents/child.md"]);
    assert!(matches!(err.root(), RuntimeError::Graph(GraphError::BlockNotFound(_))));
}

#[test]
fn invalid_directives_fail_when_reached() {
    let err = run("@teleport\nto: x\n").unwrap_err();
    assert!(matches!(err.root(), RuntimeError::UnknownDirective(name) if name == "teleport"));

    let (mut interp, _) = interpreter(&[("main.md", "# A {id=a}\n\n@goto\nblock: a/*\n")]);
    let err = interp.run_file(Path::new("main.md"), None).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::MissingParams(_)));
    assert_eq!(interp.diagnostics().len(), 1);
    assert_eq!(interp.diagnostics()[0].path, PathBuf::from("main.md"));
}

#[test]
fn top_level_input_is_prepended() {
    let (mut interp, _) = interpreter(&[("main.md", "# Body\n\n@return\nblock: question\n")]);
    let input = parse_graph("# Question {id=question}\nwhy?\n");
    let result = interp.run_file(Path::new("main.md"), Some(input)).unwrap();
    assert_eq!(contents(&result), ["# Question {id=question}\nwhy?"]);
}

#[test]
fn documents_on_disk() {
    use interpreter::services::{FsContextSink, FsLoader};

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("part.md"), "# Part {id=part}\nfrom disk\n").unwrap();
    std::fs::write(
        dir.path().join("main.md"),
        "# Main\n\n@import\nfile: part.md\n\n@return\nblock: part\n",
    )
    .unwrap();

    let log = Shared::default();
    let services = Services {
        completion: Box::new(FakeLlm(log.clone(), String::new())),
        commands: Box::new(FakeShell(log.clone(), String::new())),
        loader: Box::new(FsLoader),
        context: Box::new(FsContextSink),
        history: Box::new(interpreter::NoHistory),
    };
    let mut interp = Interpreter::new(Config::default(), services);
    let main = dir.path().join("main.md");
    let result = interp.run_file(&main, None).unwrap();
    assert_eq!(contents(&result), ["# Part {id=part}\nfrom disk"]);

    let ctx = std::fs::read_to_string(dir.path().join("main.ctx")).unwrap();
    assert!(ctx.starts_with("# Main\n\n@import\nfile: part.md\n\n# Part {id=part}\nfrom disk\n"));
    assert_eq!(interp.call_tree().get(interp.call_tree().roots().next().unwrap()).unwrap().file, "main.md");
}
