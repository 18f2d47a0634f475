//! Splits raw list parameters into tokens.
//!
//! ```text
//! _fields=name,category:id|title,discounted_price
//!         └──┘ └───────────────┘ └──────────────┘
//!          │          │                 └─ plain token
//!          │          └─ relation token, nested spec split on '|'
//!          └─ plain token
//! ```

use crate::token::{FieldToken, NestedSpec, ParsedFields, RawList, Span, Token};

/// Top-level separator between tokens.
pub const LIST_DELIMITER: char = ',';
/// Separates a relation name from its nested spec.
pub const NESTED_MARKER: char = ':';
/// Separates entries inside a nested spec.
pub const NESTED_DELIMITER: char = '|';

pub struct Lexer<'a> {
    input: &'a str,
    delimiter: char,
    /// Current byte offset into `input`.
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_delimiter(input, LIST_DELIMITER)
    }

    pub fn with_delimiter(input: &'a str, delimiter: char) -> Self {
        Lexer {
            input,
            delimiter,
            position: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// Read up to the next delimiter (or end of input) and return the
    /// trimmed segment with its span.
    fn read_segment(&mut self) -> Token<'a> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c == self.delimiter {
                break;
            }
            self.bump();
        }
        let end = self.position;
        self.bump(); // consume the delimiter

        let raw = &self.input[start..end];
        let leading = raw.len() - raw.trim_start().len();
        let text = raw.trim();
        Token {
            text,
            span: Span::new(start + leading, start + leading + text.len()),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.input.len() {
            let token = self.read_segment();
            if !token.text.is_empty() {
                return Some(token);
            }
        }
        None
    }
}

/// Flatten a raw list into trimmed, non-empty entries.
pub fn parse_list(raw: &RawList) -> Vec<String> {
    match raw {
        RawList::Empty => Vec::new(),
        RawList::Delimited(s) => Lexer::new(s).map(|t| t.text.to_string()).collect(),
        RawList::Items(items) => items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Parse one entry of a field list.
pub fn parse_field_token(text: &str) -> Option<FieldToken> {
    let text = text.trim();
    let (name, nested) = match text.split_once(NESTED_MARKER) {
        Some((name, rest)) => {
            let items: Vec<String> = Lexer::with_delimiter(rest, NESTED_DELIMITER)
                .map(|t| t.text.to_string())
                .collect();
            let nested = (!items.is_empty()).then_some(NestedSpec(items));
            (name.trim(), nested)
        }
        None => (text, None),
    };

    if name.is_empty() {
        return None;
    }
    Some(FieldToken {
        name: name.to_string(),
        nested,
    })
}

/// Parse a `_fields` style list into names and nested specs.
pub fn parse_fields(raw: &RawList) -> ParsedFields {
    let mut fields = ParsedFields::default();
    for entry in parse_list(raw) {
        if let Some(token) = parse_field_token(&entry) {
            fields.push(token);
        }
    }
    fields
}
