use std::sync::LazyLock;

use regex::Regex;

use crate::directive::{
    BlockRef, BlockSelection, Directive, DirectiveKind, FileRef, GotoParams, Header, ImportParams,
    LlmParams, Mode, Prompt, ReturnParams, RunParams, ShellParams, SourcePath,
};
use crate::parser::schema::{FieldValue, Fields};

static BLOCK_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9\-_]+(?:/[a-zA-Z0-9\-_]+)*(?:/\*)?$").expect("valid block token regex")
});

/// Turn validated fields into the typed parameters of `kind`.
pub(crate) fn shape(kind: DirectiveKind, fields: &Fields) -> Result<Directive, String> {
    let directive = match kind {
        DirectiveKind::Import => {
            let source = path(require(fields, "file")?);
            if source.file.file.is_empty() {
                return Err(format!("{}: 'file' does not name a document", kind));
            }
            Directive::Import(ImportParams {
                source,
                block: fields.text("block").map(block_ref).transpose()?,
                mode: mode(fields)?,
                to: target(fields)?,
            })
        }
        DirectiveKind::Llm => Directive::Llm(LlmParams {
            prompt: fields.text("prompt").map(str::to_string),
            block: selection(fields)?,
            media: fields.list("media").iter().map(|m| file_path(m)).collect(),
            save_to_file: fields.text("save-to-file").map(file_path),
            header: header(fields),
            mode: mode(fields)?,
            to: target(fields)?,
            provider: fields.text("provider").map(str::to_string),
            model: fields.text("model").map(str::to_string),
        }),
        DirectiveKind::Run => Directive::Run(RunParams {
            file: file_path(require(fields, "file")?),
            prompt: fields.text("prompt").map(prompt_or_block),
            block: selection(fields)?,
            header: header(fields),
            mode: mode(fields)?,
            to: target(fields)?,
        }),
        DirectiveKind::Shell => Directive::Shell(ShellParams {
            command: require(fields, "prompt")?.to_string(),
            header: header(fields),
            mode: mode(fields)?,
            to: target(fields)?,
        }),
        DirectiveKind::Return => Directive::Return(ReturnParams {
            prompt: fields.text("prompt").map(str::to_string),
            block: selection(fields)?,
            header: header(fields),
        }),
        DirectiveKind::Goto => Directive::Goto(GotoParams {
            block: block_path_no_nested(require(fields, "block")?)?,
        }),
    };
    Ok(directive)
}

fn require<'f>(fields: &'f Fields, name: &str) -> Result<&'f str, String> {
    fields
        .text(name)
        .ok_or_else(|| format!("'{}' is a required property", name))
}

fn mode(fields: &Fields) -> Result<Option<Mode>, String> {
    fields
        .text("mode")
        .map(|m| m.trim().parse::<Mode>().map_err(|e| e.to_string()))
        .transpose()
}

fn header(fields: &Fields) -> Header {
    Header::from_use_header(fields.text("use-header").map(str::to_string))
}

fn target(fields: &Fields) -> Result<Option<BlockRef>, String> {
    fields.text("to").map(block_ref).transpose()
}

fn selection(fields: &Fields) -> Result<Option<BlockSelection>, String> {
    match fields.get("block") {
        None => Ok(None),
        Some(FieldValue::Text(s)) => Ok(Some(BlockSelection::Single(block_ref(s)?))),
        Some(FieldValue::List(items)) => items
            .iter()
            .map(|s| block_ref(s))
            .collect::<Result<Vec<_>, _>>()
            .map(|refs| Some(BlockSelection::Multi(refs))),
    }
}

/// `block/sub/*` → block path plus nested flag.
pub(crate) fn block_ref(value: &str) -> Result<BlockRef, String> {
    let value = value.trim();
    let (path, nested) = match value.strip_suffix("/*") {
        Some(rest) => (rest, true),
        None if value == "*" => ("", true),
        None => (value, false),
    };
    if path.is_empty() {
        return Err(format!("'{}' does not name a block", value));
    }
    Ok(BlockRef::new(path, nested))
}

/// `dir/dir/file.ext/block/sub/*` → folder, file, optional block path.
///
/// The first segment carrying an extension is the file; segments after it
/// form the block path.
pub(crate) fn path(value: &str) -> SourcePath {
    let value = value.trim();
    let (value, nested) = match value.strip_suffix("/*") {
        Some(rest) => (rest, true),
        None => (value, false),
    };
    let parts: Vec<&str> = value.split('/').collect();

    let Some(file_idx) = parts.iter().position(|p| has_extension(p)) else {
        return SourcePath {
            file: FileRef {
                folder: String::new(),
                file: String::new(),
            },
            block: (!value.is_empty()).then(|| BlockRef::new(value, nested)),
        };
    };

    let block = parts[file_idx + 1..].join("/");
    SourcePath {
        file: FileRef {
            folder: parts[..file_idx].join("/"),
            file: parts[file_idx].to_string(),
        },
        block: (!block.is_empty()).then(|| BlockRef::new(block, nested)),
    }
}

fn has_extension(segment: &str) -> bool {
    matches!(segment.rsplit_once('.'), Some((stem, ext)) if !stem.is_empty() && !ext.is_empty())
}

/// `dir/dir/file.ext` → folder and file name.
pub(crate) fn file_path(value: &str) -> FileRef {
    match value.trim().rsplit_once('/') {
        Some((folder, file)) => FileRef {
            folder: folder.to_string(),
            file: file.to_string(),
        },
        None => FileRef {
            folder: String::new(),
            file: value.trim().to_string(),
        },
    }
}

/// A bare single-line path token is a block reference; anything else is
/// literal text, kept verbatim.
pub(crate) fn prompt_or_block(value: &str) -> Prompt {
    let stripped = value.trim();
    if !stripped.contains('\n') && BLOCK_TOKEN.is_match(stripped) {
        if let Ok(block) = block_ref(stripped) {
            return Prompt::Block(block);
        }
    }
    Prompt::Literal(value.to_string())
}

pub(crate) fn block_path_no_nested(value: &str) -> Result<String, String> {
    if value.contains('*') {
        return Err("nested flags are not allowed in this context".into());
    }
    let value = value.trim();
    if value.is_empty() {
        return Err("block path cannot be empty".into());
    }
    Ok(value.to_string())
}
