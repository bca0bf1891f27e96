use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::directive::DirectiveKind;

/// Accepted YAML shape of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Text,
    List,
    TextOrList,
}

#[derive(Debug)]
pub(crate) struct Field {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
    /// Allowed values; empty means unrestricted.
    pub values: &'static [&'static str],
}

#[derive(Debug)]
pub(crate) struct Declaration {
    pub fields: &'static [Field],
    /// At least one of these must be present.
    pub any_of: &'static [&'static str],
}

const MODES: &[&str] = &["append", "prepend", "replace"];

const fn field(name: &'static str, shape: Shape) -> Field {
    Field {
        name,
        shape,
        required: false,
        values: &[],
    }
}

const fn required(name: &'static str, shape: Shape) -> Field {
    Field {
        required: true,
        ..field(name, shape)
    }
}

const MODE: Field = Field {
    values: MODES,
    ..field("mode", Shape::Text)
};

static IMPORT: Declaration = Declaration {
    fields: &[
        required("file", Shape::Text),
        field("block", Shape::Text),
        MODE,
        field("to", Shape::Text),
    ],
    any_of: &[],
};

static LLM: Declaration = Declaration {
    fields: &[
        field("prompt", Shape::Text),
        field("block", Shape::TextOrList),
        field("media", Shape::List),
        field("save-to-file", Shape::Text),
        field("use-header", Shape::Text),
        MODE,
        field("to", Shape::Text),
        field("provider", Shape::Text),
        field("model", Shape::Text),
    ],
    any_of: &["prompt", "block"],
};

static RUN: Declaration = Declaration {
    fields: &[
        required("file", Shape::Text),
        field("prompt", Shape::Text),
        field("block", Shape::TextOrList),
        field("use-header", Shape::Text),
        MODE,
        field("to", Shape::Text),
    ],
    any_of: &[],
};

static SHELL: Declaration = Declaration {
    fields: &[
        required("prompt", Shape::Text),
        field("use-header", Shape::Text),
        MODE,
        field("to", Shape::Text),
    ],
    any_of: &[],
};

static RETURN: Declaration = Declaration {
    fields: &[
        field("prompt", Shape::Text),
        field("block", Shape::TextOrList),
        field("use-header", Shape::Text),
    ],
    any_of: &["prompt", "block"],
};

static GOTO: Declaration = Declaration {
    fields: &[required("block", Shape::Text)],
    any_of: &[],
};

pub(crate) fn declaration(kind: DirectiveKind) -> &'static Declaration {
    match kind {
        DirectiveKind::Import => &IMPORT,
        DirectiveKind::Llm => &LLM,
        DirectiveKind::Run => &RUN,
        DirectiveKind::Shell => &SHELL,
        DirectiveKind::Return => &RETURN,
        DirectiveKind::Goto => &GOTO,
    }
}

/// A validated field value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Text(String),
    List(Vec<String>),
}

/// Validated fields of one directive, keyed by declared name.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Fields(BTreeMap<&'static str, FieldValue>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.0.get(name) {
            Some(FieldValue::List(items)) => items,
            _ => &[],
        }
    }
}

/// Parse a directive's YAML body and check it against its declaration.
pub(crate) fn validate(kind: DirectiveKind, body: &str) -> Result<Fields, String> {
    let decl = declaration(kind);
    let value: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(body).map_err(|e| format!("YAML parsing error in {}: {}", kind, e))?
    };

    let mapping = match value {
        Value::Null => serde_yaml::Mapping::new(),
        Value::Mapping(m) => m,
        _ => return Err(format!("parameters of {} must be a key/value map", kind)),
    };

    let mut fields = Fields::default();
    for (key, value) in mapping {
        let Value::String(key) = key else {
            return Err(format!("{}: field names must be strings", kind));
        };
        let field = decl
            .fields
            .iter()
            .find(|f| f.name == key)
            .ok_or_else(|| format!("{}: unknown field '{}'", kind, key))?;
        let value = shape_value(kind, field, value)?;
        if let FieldValue::Text(s) = &value {
            if !field.values.is_empty() && !field.values.contains(&s.as_str()) {
                return Err(format!(
                    "{}: '{}' is not one of {} for '{}'",
                    kind,
                    s,
                    field.values.join(", "),
                    field.name
                ));
            }
        }
        fields.0.insert(field.name, value);
    }

    if let Some(missing) = decl
        .fields
        .iter()
        .find(|f| f.required && fields.get(f.name).is_none())
    {
        return Err(format!("{}: '{}' is a required property", kind, missing.name));
    }
    if !decl.any_of.is_empty() && decl.any_of.iter().all(|name| fields.get(name).is_none()) {
        return Err(format!(
            "{}: at least one of {} must be provided",
            kind,
            decl.any_of.join(" or ")
        ));
    }

    Ok(fields)
}

fn shape_value(kind: DirectiveKind, field: &Field, value: Value) -> Result<FieldValue, String> {
    let mismatch = |expected: &str| format!("{}: '{}' must be {}", kind, field.name, expected);
    match (field.shape, value) {
        (Shape::Text | Shape::TextOrList, Value::String(s)) => Ok(FieldValue::Text(s)),
        (Shape::List | Shape::TextOrList, Value::Sequence(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(mismatch("a list of strings")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::List),
        (Shape::Text, _) => Err(mismatch("a string")),
        (Shape::List, _) => Err(mismatch("a list of strings")),
        (Shape::TextOrList, _) => Err(mismatch("a string or a list of strings")),
    }
}
