use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser as CmarkParser, TagEnd};
use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#+ ").expect("valid heading regex"));
static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*@[A-Za-z]+").expect("valid directive regex"));
static HEADING_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\{id=([A-Za-z][A-Za-z0-9_-]*)\}\s*$").expect("valid heading id regex")
});

/// Columns per indentation step; also the width of one directive level.
pub(crate) const INDENT_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BlockKind {
    Content {
        level: usize,
        title: String,
        id: Option<String>,
    },
    Directive {
        name: String,
        level: usize,
    },
}

/// One block as cut from the source, before directive parameters are shaped.
#[derive(Debug, Clone)]
pub(crate) struct RawBlock {
    pub kind: BlockKind,
    /// Block text with the block's own indentation removed, trimmed.
    pub text: String,
    pub span: Range<usize>,
}

/// Text that belongs to no block.
#[derive(Debug, Clone)]
pub(crate) struct StrayText {
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Heading,
    Directive,
    /// After a directive body ended, until the next heading or directive.
    Detached,
}

struct Builder<'a> {
    kind: BlockKind,
    indent: usize,
    lines: Vec<&'a str>,
    span: Range<usize>,
}

impl<'a> Builder<'a> {
    fn new(kind: BlockKind, indent: usize, line: &'a str, span: Range<usize>) -> Self {
        Builder {
            kind,
            indent,
            lines: vec![line],
            span,
        }
    }

    fn push(&mut self, line: &'a str, span: &Range<usize>) {
        self.lines.push(line);
        self.span.end = span.end;
    }

    fn finish(self) -> Option<RawBlock> {
        let text = self
            .lines
            .iter()
            .map(|l| strip_indent(l, self.indent))
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(RawBlock {
            kind: self.kind,
            text: text.to_string(),
            span: self.span,
        })
    }
}

/// Cut `source` into ordered heading and directive blocks.
///
/// A heading line starts a content block that runs to the next block start.
/// A directive starts at `@name` on the first line or after a blank line and
/// runs until a blank line that is not the last line of the source. Lines
/// after a directive body that precede the next block are returned as stray.
///
/// Heading lines may be indented, since outline rendering indents nested
/// headings and must read back the same blocks. In exchange an indented
/// `# ...` line in ordinary text starts a block. Lines inside a fenced code
/// block (```` ``` ```` or `~~~`) of a content block never start one.
pub(crate) fn split_blocks(source: &str) -> (Vec<RawBlock>, Vec<StrayText>) {
    let lines = source_lines(source);
    let last = lines.len().saturating_sub(1);

    let mut blocks = Vec::new();
    let mut stray = Vec::new();
    let mut state = State::Preamble;
    let mut current: Option<Builder<'_>> = None;
    let mut previous: Option<&str> = None;
    let mut in_fence = false;

    for (idx, (line, span)) in lines.iter().enumerate() {
        let line = *line;
        let indent = indent_width(line);

        if in_fence {
            if let Some(builder) = current.as_mut() {
                builder.push(line, span);
            }
            in_fence = !is_fence(line);
        } else if state != State::Directive && HEADING.is_match(line) {
            flush(current.take(), &mut blocks);
            let trimmed = line.trim_start();
            let level = trimmed.len() - trimmed.trim_start_matches('#').len();
            let id = HEADING_ID.captures(trimmed).map(|c| c[1].to_string());
            let kind = BlockKind::Content {
                level,
                title: heading_title(trimmed),
                id,
            };
            current = Some(Builder::new(kind, indent, line, span.clone()));
            state = State::Heading;
        } else if DIRECTIVE.is_match(line) && previous.is_none_or(|p| p.trim().is_empty()) {
            flush(current.take(), &mut blocks);
            let name = line.trim().trim_start_matches('@').trim().to_string();
            let kind = BlockKind::Directive {
                name,
                level: 1 + indent / INDENT_WIDTH,
            };
            current = Some(Builder::new(kind, indent, line, span.clone()));
            state = State::Directive;
        } else {
            if matches!(state, State::Preamble | State::Heading) && is_fence(line) {
                in_fence = true;
            }
            match state {
                State::Preamble => match current.as_mut() {
                    Some(builder) => builder.push(line, span),
                    None => {
                        let kind = BlockKind::Content {
                            level: 0,
                            title: String::new(),
                            id: None,
                        };
                        current = Some(Builder::new(kind, 0, line, span.clone()));
                    }
                },
                State::Heading => {
                    if let Some(builder) = current.as_mut() {
                        builder.push(line, span);
                    }
                }
                State::Directive => {
                    if line.trim().is_empty() && idx != last {
                        flush(current.take(), &mut blocks);
                        state = State::Detached;
                    } else if let Some(builder) = current.as_mut() {
                        builder.push(line, span);
                    }
                }
                State::Detached => {
                    if !line.trim().is_empty() {
                        stray.push(StrayText { span: span.clone() });
                    }
                }
            }
        }

        previous = Some(line);
    }
    flush(current.take(), &mut blocks);

    (blocks, stray)
}

fn is_fence(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("```") || line.starts_with("~~~")
}

fn flush(builder: Option<Builder<'_>>, blocks: &mut Vec<RawBlock>) {
    if let Some(block) = builder.and_then(Builder::finish) {
        blocks.push(block);
    }
}

/// Lines of `source` with their byte spans, line terminators excluded.
fn source_lines(source: &str) -> Vec<(&str, Range<usize>)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for raw in source.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\n', '\r']);
        out.push((line, offset..offset + line.len()));
        offset += raw.len();
    }
    out
}

/// Leading whitespace width, tabs counting as one indentation step.
pub(crate) fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { INDENT_WIDTH } else { 1 })
        .sum()
}

/// Remove up to `width` columns of leading whitespace.
fn strip_indent(line: &str, width: usize) -> &str {
    let mut consumed = 0;
    for (pos, c) in line.char_indices() {
        if consumed >= width || !c.is_whitespace() {
            return &line[pos..];
        }
        consumed += if c == '\t' { INDENT_WIDTH } else { 1 };
    }
    ""
}

/// Plain heading text: markup removed, `{id=...}` removed, whitespace collapsed.
fn heading_title(line: &str) -> String {
    let text = line.trim_start_matches('#');
    let text = HEADING_ID.replace(text, "");
    // Re-wrap as a level-1 heading so list markers and the like stay literal.
    let wrapped = format!("# {}", text.trim());

    let mut title = String::new();
    for event in CmarkParser::new(&wrapped) {
        match event {
            Event::Text(s) | Event::Code(s) => title.push_str(&s),
            Event::SoftBreak | Event::HardBreak => title.push(' '),
            Event::End(TagEnd::Heading(_)) => break,
            _ => {}
        }
    }
    normalize_title(&title)
}

fn normalize_title(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}
