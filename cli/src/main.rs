mod process;
mod settings;
mod test_runner;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::info;
use tracing_subscriber::EnvFilter;

use interpreter::{FileDiagnostics, Interpreter, RuntimeError, Services};
use livedoc::graph::extract_path;
use livedoc::parser::ParseError;
use livedoc::{Graph, RenderStyle, render};

use crate::process::{ProcessCompletion, ShellRunner};
use crate::settings::{Overrides, Settings};

#[derive(Parser)]
#[command(name = "livedoc", version, about = "Executable markdown documents")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log directive execution (same as RUST_LOG=info)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a document, writing context files and call_tree.json
    Run(RunArgs),

    /// Parse a document and report directive diagnostics
    Check(CheckArgs),

    /// Run .test.md fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Markdown document to execute
    file: PathBuf,

    /// Settings file
    #[arg(long, default_value = "settings.toml")]
    settings: PathBuf,

    /// Default LLM provider
    #[arg(long)]
    provider: Option<String>,

    /// Default LLM model
    #[arg(long)]
    model: Option<String>,

    /// Default mode for directives that name none (append, prepend, replace)
    #[arg(long)]
    mode: Option<String>,

    /// Document placed ahead of the first node
    #[arg(long)]
    input: Option<PathBuf>,

    /// Only take this block path of the input document
    #[arg(long, requires = "input")]
    input_block: Option<String>,

    /// Print the frame result to stdout
    #[arg(long)]
    print: bool,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Markdown document to check
    file: PathBuf,

    /// Print the parsed block structure
    #[arg(long)]
    outline: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let code = match cli.command {
        Command::Run(args) => do_run(args, color),
        Command::Check(args) => do_check(args, color),
        Command::Test(args) => {
            if args.list_categories {
                test_runner::list_categories(&args.path);
                0
            } else {
                test_runner::run_tests(&args.path, cli.no_color, &args.category)
            }
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn do_run(args: RunArgs, color: ColorChoice) -> i32 {
    let settings = match Settings::load(&args.settings) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let overrides = Overrides {
        provider: args.provider,
        model: args.model,
        mode: args.mode,
    };
    let config = match settings.to_config(&overrides) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let input = match args.input.as_deref() {
        Some(path) => match load_input(path, args.input_block.as_deref()) {
            Ok(graph) => Some(graph),
            Err(e) => return fail(&e),
        },
        None => None,
    };

    let services = Services::filesystem(
        Box::new(ProcessCompletion::new(&settings.llm)),
        Box::new(ShellRunner::new(settings.environment.clone())),
    );
    let mut interp = Interpreter::new(config, services);
    info!(file = %args.file.display(), "running");
    let result = interp.run_file(&args.file, input);

    emit_file_diagnostics(interp.diagnostics(), color);
    write_call_tree(&interp, &args.file);

    match result {
        Ok(graph) => {
            if args.print {
                print!("{}", render(&graph, RenderStyle::Flat));
            }
            0
        }
        Err(err) => {
            report_runtime_error(&err);
            1
        }
    }
}

fn do_check(args: CheckArgs, color: ColorChoice) -> i32 {
    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => return fail(&format!("cannot read '{}': {}", args.file.display(), e)),
    };
    let parsed = livedoc::parser::Parser::new(source.clone(), 0).parse();

    let mut files = SimpleFiles::new();
    files.add(args.file.display().to_string(), source);
    emit(&files, &parsed.diagnostics, color);

    if args.outline {
        for node in parsed.graph.iter() {
            let pad = "  ".repeat(node.level.saturating_sub(1));
            let id = node.id.as_deref().map(|id| format!(" {{id={}}}", id)).unwrap_or_default();
            if node.is_directive() {
                println!("{}@{}", pad, node.name);
            } else if node.level == 0 {
                println!("(preamble)");
            } else {
                println!("{}{} {}{}", pad, "#".repeat(node.level), node.name, id);
            }
        }
    }

    if parsed.has_errors() {
        1
    } else {
        eprintln!("ok: {} parsed successfully", args.file.display());
        0
    }
}

/// The `--input` document, narrowed to `--input-block` when given.
fn load_input(path: &Path, block: Option<&str>) -> Result<Graph, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let graph = livedoc::parse_graph(&text);
    match block {
        Some(block) => {
            let (block, nested) = match block.strip_suffix("/*") {
                Some(stem) => (stem, true),
                None => (block, false),
            };
            extract_path(&graph, block, nested).map_err(|e| format!("--input-block: {}", e))
        }
        None => Ok(graph),
    }
}

fn emit_file_diagnostics(diagnostics: &[FileDiagnostics], color: ColorChoice) {
    let mut files = SimpleFiles::new();
    for entry in diagnostics {
        files.add(entry.path.display().to_string(), entry.source.clone());
    }
    let all: Vec<ParseError> = diagnostics.iter().flat_map(|d| d.errors.iter().cloned()).collect();
    emit(&files, &all, color);
}

fn emit(files: &SimpleFiles<String, String>, errors: &[ParseError], color: ColorChoice) {
    let writer = StandardStream::stderr(color);
    let config = term::Config::default();
    for error in errors {
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &error.to_diagnostic());
    }
}

fn write_call_tree(interp: &Interpreter, document: &Path) {
    let target = document
        .parent()
        .unwrap_or(Path::new(""))
        .join("call_tree.json");
    let written = interp
        .call_tree()
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(&target, json).map_err(|e| e.to_string()));
    if let Err(e) = written {
        eprintln!("warning: cannot write '{}': {}", target.display(), e);
    }
}

fn report_runtime_error(err: &RuntimeError) {
    let chain = err.file_chain();
    if chain.is_empty() {
        eprintln!("runtime error: {}", err.root());
    } else {
        eprintln!("runtime error: {}: {}", chain.join(" -> "), err.root());
    }
}

fn fail(message: &str) -> i32 {
    eprintln!("error: {}", message);
    1
}
