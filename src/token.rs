//! Token definitions for the field, sort and group lists.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

/// A single list entry, with its location in the raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Span,
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A raw list parameter as it arrives from the request: either one
/// delimited string (`a,b,c`) or an already split sequence (`a[]=..`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawList {
    #[default]
    Empty,
    Delimited(String),
    Items(Vec<String>),
}

impl RawList {
    /// Build from a request value. Scalars inside arrays are stringified,
    /// anything that is neither a string nor an array is treated as empty.
    pub fn from_json(value: Option<&JsonValue>) -> Self {
        match value {
            Some(JsonValue::String(s)) => RawList::Delimited(s.clone()),
            Some(JsonValue::Array(items)) => RawList::Items(
                items
                    .iter()
                    .filter_map(|item| match item {
                        JsonValue::String(s) => Some(s.clone()),
                        JsonValue::Number(n) => Some(n.to_string()),
                        JsonValue::Bool(b) => Some(b.to_string()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => RawList::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawList::Empty => true,
            RawList::Delimited(s) => s.trim().is_empty(),
            RawList::Items(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }
}

impl From<&str> for RawList {
    fn from(value: &str) -> Self {
        RawList::Delimited(value.to_string())
    }
}

impl From<Vec<String>> for RawList {
    fn from(value: Vec<String>) -> Self {
        RawList::Items(value)
    }
}

/// Sub-selection attached to a relation token, e.g. `title|body` in
/// `posts:title|body`. Entries are kept raw and re-parsed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NestedSpec(pub Vec<String>);

impl NestedSpec {
    pub fn items(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the sub-tokens as a field list of their own.
    pub fn parse(&self) -> ParsedFields {
        crate::lexer::parse_fields(&RawList::Items(self.0.clone()))
    }
}

/// A requested name plus its optional nested selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldToken {
    pub name: String,
    pub nested: Option<NestedSpec>,
}

/// Output of field parsing: bare names in request order plus the nested
/// specs keyed by the name that carried them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedFields {
    pub names: Vec<String>,
    pub nested: BTreeMap<String, NestedSpec>,
}

impl ParsedFields {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn nested_for(&self, name: &str) -> Option<&NestedSpec> {
        self.nested.get(name)
    }

    pub(crate) fn push(&mut self, token: FieldToken) {
        if !self.contains(&token.name) {
            self.names.push(token.name.clone());
        }
        if let Some(nested) = token.nested {
            self.nested.insert(token.name, nested);
        }
    }
}
