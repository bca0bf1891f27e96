use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use interpreter::{
    CommandRunner, CompletionRequest, Config, ContextSink, DocumentLoader, Interpreter, NoHistory,
    RuntimeError, Services, TextCompletion,
};
use livedoc::parser::ParseError;
use livedoc::{RenderStyle, render};

#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Substring that must appear in the diagnostic message.
    pub contains: String,

    /// If set, the diagnostic's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    #[serde(default)]
    pub description: Option<String>,

    /// Expected rendered frame result (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// The runtime error's display chain must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected parse diagnostics. If present (even empty), count and
    /// content are checked.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedWarning>>,

    /// Canned reply for every `@llm`.
    #[serde(default)]
    pub llm_reply: Option<String>,

    /// Canned output for every `@shell`.
    #[serde(default)]
    pub shell_reply: Option<String>,
}

/// Split a `.test.md` file into its TOML frontmatter and document source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let body = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
        .ok_or("missing opening --- frontmatter delimiter")?;
    let close = body
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let frontmatter = body[..close].trim_end_matches('\r');
    let rest = &body[close + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config = toml::from_str(frontmatter).map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, source))
}

struct Canned(String);

impl TextCompletion for Canned {
    fn complete_text(&mut self, _request: &CompletionRequest) -> Result<String, String> {
        Ok(self.0.clone())
    }
}

impl CommandRunner for Canned {
    fn run_command(&mut self, _command: &str) -> Result<String, String> {
        Ok(self.0.clone())
    }
}

/// Serves the fixture's own document from memory and everything else from
/// disk, so fixtures can import neighbouring files.
struct FixtureLoader {
    path: PathBuf,
    source: String,
}

impl DocumentLoader for FixtureLoader {
    fn load_document(&mut self, path: &Path) -> io::Result<String> {
        if path == self.path {
            Ok(self.source.clone())
        } else {
            std::fs::read_to_string(path)
        }
    }
}

/// Fixtures never leave context files behind.
struct Discard;

impl ContextSink for Discard {
    fn write_file(&mut self, _path: &Path, _contents: &str) -> io::Result<()> {
        Ok(())
    }
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description
            .as_deref()
            .or_else(|| self.path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or("?")
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let (description, outcome) = match evaluate(path) {
        Ok((description, None)) => (description, TestOutcome::Pass),
        Ok((description, Some(reason))) => (description, TestOutcome::Fail(reason)),
        Err(reason) => (None, TestOutcome::Fail(reason)),
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Run one fixture. `Ok((description, Some(reason)))` is a failed check;
/// `Err` means the fixture itself is unusable.
fn evaluate(path: &Path) -> Result<(Option<String>, Option<String>), String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("cannot read file: {}", e))?;
    let (config, source) = parse_test_file(&content).map_err(|e| format!("frontmatter error: {}", e))?;

    let services = Services {
        completion: Box::new(Canned(config.llm_reply.clone().unwrap_or_default())),
        commands: Box::new(Canned(config.shell_reply.clone().unwrap_or_default())),
        loader: Box::new(FixtureLoader {
            path: path.to_path_buf(),
            source: source.to_string(),
        }),
        context: Box::new(Discard),
        history: Box::new(NoHistory),
    };
    let mut interp = Interpreter::new(Config::default(), services);
    let result = interp.run_file(path, None);

    let failure = check_result(&config, result).or_else(|| {
        let diagnostics: Vec<&ParseError> = interp
            .diagnostics()
            .iter()
            .flat_map(|d| d.errors.iter())
            .collect();
        config
            .expect_warnings
            .as_ref()
            .and_then(|expected| check_warnings(source, &diagnostics, expected))
    });
    Ok((config.description, failure))
}

fn check_result(config: &TestConfig, result: Result<livedoc::Graph, RuntimeError>) -> Option<String> {
    match (&config.expect_error, result) {
        (Some(expected), Err(err)) => {
            let message = error_chain(&err);
            (!message.contains(expected.as_str()))
                .then(|| format!("expected error containing \"{}\", got: {}", expected, message))
        }
        (Some(expected), Ok(_)) => Some(format!(
            "expected error containing \"{}\", but execution succeeded",
            expected
        )),
        (None, Err(err)) => Some(format!("unexpected runtime error: {}", error_chain(&err))),
        (None, Ok(graph)) => {
            let expected = config.expect_output.as_deref()?.trim();
            let rendered = render(&graph, RenderStyle::Flat);
            let actual = rendered.trim();
            (actual != expected).then(|| {
                format!(
                    "output mismatch\n  expected:\n{}\n  actual:\n{}",
                    indent(expected),
                    indent(actual)
                )
            })
        }
    }
}

/// `a.md: b.md: block 'x' not found`
fn error_chain(err: &RuntimeError) -> String {
    let mut parts: Vec<String> = err.file_chain().iter().map(|f| f.to_string()).collect();
    parts.push(err.root().to_string());
    parts.join(": ")
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {}", l)).collect::<Vec<_>>().join("\n")
}

/// Compare diagnostics against expectations. Returns `Some(reason)` on mismatch.
fn check_warnings(source: &str, actual: &[&ParseError], expected: &[ExpectedWarning]) -> Option<String> {
    if actual.len() != expected.len() {
        let listed = if actual.is_empty() {
            "    (none)".to_string()
        } else {
            actual
                .iter()
                .map(|d| format!("  - {}", d.message))
                .collect::<Vec<_>>()
                .join("\n")
        };
        return Some(format!(
            "expected {} diagnostic(s), got {}\n  actual diagnostics:\n{}",
            expected.len(),
            actual.len(),
            listed
        ));
    }

    for (i, (diag, want)) in actual.iter().zip(expected).enumerate() {
        if !diag.message.contains(&want.contains) {
            return Some(format!(
                "diagnostic[{}]: expected message containing \"{}\", got: {}",
                i, want.contains, diag.message
            ));
        }
        if let Some(line) = want.line {
            let found = diag.line_in(source);
            if found != line {
                return Some(format!(
                    "diagnostic[{}]: expected on line {}, but span is on line {}",
                    i, line, found
                ));
            }
        }
    }
    None
}

/// `.test.md` files grouped by folder relative to `root`; files directly in
/// `root` get the empty category.
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".test.md"));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Terminal styling, off under `--no-color`.
#[derive(Clone, Copy)]
struct Palette {
    color: bool,
}

impl Palette {
    fn paint(self, text: &str, code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    fn pass(self) -> String {
        self.paint("PASS", "32")
    }

    fn fail(self) -> String {
        self.paint("FAIL", "31")
    }

    fn bold(self, text: &str) -> String {
        self.paint(text, "1")
    }
}

/// Pick the categories to run. Requested names match a category or any of
/// its subfolders.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }
    let mut selected = BTreeMap::new();
    for name in requested {
        let name = name.trim_matches('/');
        let prefix = format!("{}/", name);
        let before = selected.len();
        for (category, files) in all {
            if category == name || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            let available: Vec<_> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                name,
                available.join(", ")
            );
        }
    }
    selected
}

/// Run every `.test.md` under `path` (or the single file). Returns the
/// process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let palette = Palette { color: !no_color };
    let mut results = Vec::new();

    if path.is_file() {
        let result = run_single_test(path);
        report_line(&result, palette);
        results.push(result);
    } else {
        let all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no .test.md files found in {}", path.display());
            return 1;
        }
        let selected = select(&all, categories);
        if selected.is_empty() {
            eprintln!("no matching categories found");
            return 1;
        }
        for (category, files) in selected {
            eprintln!();
            eprintln!("{}", palette.bold(category_label(category)));
            for file in files {
                let result = run_single_test(file);
                report_line(&result, palette);
                results.push(result);
            }
        }
    }

    summarize(&results, palette)
}

fn report_line(result: &TestResult, palette: Palette) {
    let status = match result.outcome {
        TestOutcome::Pass => palette.pass(),
        TestOutcome::Fail(_) => palette.fail(),
    };
    eprintln!("  {}  {}", status, result.label());
}

fn summarize(results: &[TestResult], palette: Palette) -> i32 {
    let failures: Vec<_> = results
        .iter()
        .filter_map(|r| match &r.outcome {
            TestOutcome::Fail(reason) => Some((r, reason)),
            TestOutcome::Pass => None,
        })
        .collect();
    let passed = results.len() - failures.len();

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for (result, reason) in &failures {
            eprintln!();
            eprintln!("  --- {} ---", result.path.display());
            for line in reason.lines() {
                eprintln!("  {}", line);
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", palette.paint("ok", "32"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            palette.paint("FAILED", "31"),
            passed,
            failures.len(),
            results.len()
        );
        1
    }
}
