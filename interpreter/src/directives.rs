use livedoc::directive::{
    BlockRef, BlockSelection, Directive, GotoParams, Header, ImportParams, LlmParams, Mode, Prompt,
    ReturnParams, RunParams, ShellParams,
};
use livedoc::graph::{Spliced, extract_path, splice, splice_at};
use livedoc::parser::Parser;
use livedoc::render::text_of;
use livedoc::{Graph, GraphError, Node, NodeKey, parse_graph};
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::executor::{Interpreter, Invocation};
use crate::frame::Frame;
use crate::services::CompletionRequest;

/// Where execution goes after a directive.
#[derive(Debug)]
pub(crate) enum Flow {
    Next(Option<NodeKey>),
    Return(Graph),
}

pub(crate) fn execute(frame: &mut Frame, node: &Node, interp: &mut Interpreter) -> Result<Flow, RuntimeError> {
    let kind = node
        .directive_kind()
        .ok_or_else(|| RuntimeError::UnknownDirective(node.name.clone()))?;
    let params = node.params.as_ref().ok_or(RuntimeError::MissingParams(kind))?;
    info!(directive = %kind, key = %node.key, "executing");

    match params {
        Directive::Import(p) => import(frame, node, p, interp),
        Directive::Llm(p) => llm(frame, node, p, interp),
        Directive::Run(p) => run(frame, node, p, interp),
        Directive::Shell(p) => shell(frame, node, p, interp),
        Directive::Return(p) => return_block(frame, p, interp),
        Directive::Goto(p) => goto(frame, p, interp),
    }
}

fn import(frame: &mut Frame, node: &Node, p: &ImportParams, interp: &mut Interpreter) -> Result<Flow, RuntimeError> {
    let path = frame.folder().join(p.source.file.relative());
    let text = interp
        .services
        .loader
        .load_document(&path)
        .map_err(|e| RuntimeError::io(&path, e))?;
    let parsed = Parser::new(text, 0).parse();
    for diagnostic in &parsed.diagnostics {
        warn!(file = %path.display(), message = %diagnostic.message, "imported document has an invalid directive");
    }

    let source = match p.source_block() {
        Some(block) => extract_path(&parsed.graph, &block.path, block.nested)?,
        None => parsed.graph,
    };
    let mode = interp.config.mode_or_default(p.mode);
    commit(frame, node, source, p.to.as_ref(), mode)
}

fn llm(frame: &mut Frame, node: &Node, p: &LlmParams, interp: &mut Interpreter) -> Result<Flow, RuntimeError> {
    let blocks = gather(&frame.graph, p.block.as_ref())?;
    let prompt = match (&p.prompt, blocks.is_empty()) {
        (Some(literal), true) => {
            let context = preceding_content(&frame.graph, &node.key);
            if context.is_empty() {
                literal.clone()
            } else {
                format!("{}\n\n{}", context, literal)
            }
        }
        (Some(literal), false) => format!("{}\n\n{}", text_of(&blocks), literal),
        (None, false) => text_of(&blocks),
        (None, true) => return Err(RuntimeError::InvalidParams("@llm needs a prompt or a block".into())),
    };

    let request = CompletionRequest {
        prompt,
        provider: p.provider.clone().or_else(|| interp.config.default_provider.clone()),
        model: p.model.clone().or_else(|| interp.config.default_model.clone()),
        media: p.media.iter().map(|m| frame.folder().join(m.relative())).collect(),
    };
    info!(
        provider = request.provider.as_deref().unwrap_or("default"),
        chars = request.prompt.len(),
        media = request.media.len(),
        "@llm request"
    );
    let reply = interp
        .services
        .completion
        .complete_text(&request)
        .map_err(RuntimeError::Completion)?;

    if let Some(file) = &p.save_to_file {
        let path = frame.folder().join(file.relative());
        interp
            .services
            .context
            .write_file(&path, &reply)
            .map_err(|e| RuntimeError::io(&path, e))?;
    }

    let source = response_graph(&p.header, &interp.config.llm_header, &reply);
    let mode = interp.config.mode_or_default(p.mode);
    commit(frame, node, source, p.to.as_ref(), mode)
}

fn shell(frame: &mut Frame, node: &Node, p: &ShellParams, interp: &mut Interpreter) -> Result<Flow, RuntimeError> {
    let command = strip_quotes(&p.command);
    info!(command, "@shell");
    let output = interp
        .services
        .commands
        .run_command(command)
        .map_err(RuntimeError::Command)?;

    let source = response_graph(&p.header, &interp.config.shell_header, &output);
    let mode = interp.config.mode_or_default(p.mode);
    commit(frame, node, source, p.to.as_ref(), mode)
}

fn run(frame: &mut Frame, node: &Node, p: &RunParams, interp: &mut Interpreter) -> Result<Flow, RuntimeError> {
    let mut input = gather(&frame.graph, p.block.as_ref())?;
    match &p.prompt {
        Some(Prompt::Literal(text)) => {
            input.extend(parse_graph(&p.header.wrap(&interp.config.input_header, text.trim_end())).into_nodes());
        }
        Some(Prompt::Block(block)) => {
            input.extend(extract_path(&frame.graph, &block.path, block.nested)?.into_nodes());
        }
        None => {}
    }

    let path = frame.folder().join(p.file.relative());
    let invocation = Invocation {
        operation_src: Some(node.content.clone()),
        parent: frame.record,
    };
    let result = interp.run_frame(&path, (!input.is_empty()).then_some(input), invocation)?;

    let mode = interp.config.mode_or_default(p.mode);
    commit(frame, node, result, p.to.as_ref(), mode)
}

fn goto(frame: &mut Frame, p: &GotoParams, interp: &Interpreter) -> Result<Flow, RuntimeError> {
    let target = frame
        .graph
        .find_by_id(&p.block)
        .ok_or_else(|| GraphError::BlockNotFound(p.block.clone()))?
        .key
        .clone();

    let count = frame.goto_counts.entry(target.clone()).or_insert(0);
    *count += 1;
    if *count > interp.config.goto_limit {
        return Err(RuntimeError::LoopLimitExceeded {
            block: p.block.clone(),
            limit: interp.config.goto_limit,
        });
    }
    debug!(block = %p.block, count = *count, "@goto");
    Ok(Flow::Next(Some(target)))
}

fn return_block(frame: &Frame, p: &ReturnParams, interp: &Interpreter) -> Result<Flow, RuntimeError> {
    let blocks = gather(&frame.graph, p.block.as_ref())?;
    let result = if blocks.is_empty() {
        let text = p
            .prompt
            .as_deref()
            .ok_or_else(|| RuntimeError::InvalidParams("@return needs a prompt or a block".into()))?;
        parse_graph(&p.header.wrap(&interp.config.return_header, text.trim_end()))
    } else {
        let mut result = Graph::new();
        if let Header::Custom(header) = &p.header {
            result.extend(parse_graph(header).into_nodes());
        }
        result.extend(blocks.into_nodes());
        if let Some(text) = &p.prompt {
            result.extend(parse_graph(text).into_nodes());
        }
        result
    };
    info!(nodes = result.len(), "@return");
    Ok(Flow::Return(result))
}

/// Splice `source` at the directive's target (or its own position) and pick
/// the node to continue with.
fn commit(
    frame: &mut Frame,
    node: &Node,
    source: Graph,
    to: Option<&BlockRef>,
    mode: Mode,
) -> Result<Flow, RuntimeError> {
    let next = frame.graph.next_key(&node.key).cloned();
    let spliced = match to {
        Some(target) => splice(&mut frame.graph, source, &target.path, target.nested, mode)?,
        None => splice_at(&mut frame.graph, source, &node.key, false, mode)?,
    };
    Ok(Flow::Next(resume_point(&frame.graph, next, &spliced)))
}

/// The directive's original successor, or the node after the spliced region
/// when that successor was replaced away.
fn resume_point(graph: &Graph, next: Option<NodeKey>, spliced: &Spliced) -> Option<NodeKey> {
    match next {
        Some(key) if graph.contains(&key) => Some(key),
        Some(_) => graph.next_key(&spliced.last).cloned(),
        None => None,
    }
}

/// Copies of every referenced block, concatenated in declaration order.
fn gather(graph: &Graph, selection: Option<&BlockSelection>) -> Result<Graph, RuntimeError> {
    let mut out = Graph::new();
    for block in selection.map(BlockSelection::refs).unwrap_or_default() {
        out.extend(extract_path(graph, &block.path, block.nested)?.into_nodes());
    }
    Ok(out)
}

/// Content of every non-directive node before `key`.
fn preceding_content(graph: &Graph, key: &NodeKey) -> String {
    graph
        .iter()
        .take_while(|n| n.key != *key)
        .filter(|n| !n.is_directive())
        .map(|n| n.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn response_graph(header: &Header, default: &str, body: &str) -> Graph {
    parse_graph(&header.wrap(default, body.trim_end()))
}

/// Drop one pair of matching quotes around the whole command.
fn strip_quotes(command: &str) -> &str {
    let command = command.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = command
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    command
}
