//! Reference paths.
//!
//! A reference is the data-access part of an expression: a root accessor
//! followed by member, call, and index segments, for example
//! `$('Function').item.json.str` or `$items("Function", 0, 0)[3].json`.
//! Surrounding `{{ }}` delimiters are accepted and ignored.

use serde_json::Value;
use tracing::trace;

use crate::accessor::{DataProxy, Resolution};
use crate::context::ContextValue;
use crate::error::ProxyError;
use crate::proxy::WorkflowDataProxy;

/// Bracketed selector: `["name"]` or `[3]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Key {
    Name(String),
    Position(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    /// `.name` or `.name(args)`
    Member { name: String, args: Option<Vec<Value>> },
    Index(Key),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReferencePath {
    pub(crate) root: String,
    pub(crate) root_args: Option<Vec<Value>>,
    pub(crate) segments: Vec<Segment>,
}

/// Resolves `text` against the proxy's composite accessor.
///
/// Missing JSON members resolve to [`ContextValue::Undefined`]; proxy failures
/// such as an unknown node propagate unchanged.
pub fn resolve_reference(proxy: &WorkflowDataProxy<'_>, text: &str) -> Result<Resolution, ProxyError> {
    let reference = strip_delimiters(text);
    let path = parse_reference(reference).map_err(|message| ProxyError::invalid_reference(reference, message))?;
    trace!(reference, segments = path.segments.len(), "resolving reference");

    evaluate(proxy.data_proxy(), &path).map_err(|error| match error {
        ProxyError::InvalidReference { message, .. } => ProxyError::invalid_reference(reference, message),
        other => other,
    })
}

/// Like [`resolve_reference`], but a path that stops on an accessor is an error.
pub fn resolve_value(proxy: &WorkflowDataProxy<'_>, text: &str) -> Result<ContextValue, ProxyError> {
    match resolve_reference(proxy, text)? {
        Resolution::Value(value) => Ok(value),
        Resolution::Accessor(_) => Err(ProxyError::invalid_reference(
            strip_delimiters(text),
            "reference ends on an accessor; select one of its members",
        )),
    }
}

fn strip_delimiters(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|inner| inner.strip_suffix("}}"))
        .map_or(trimmed, str::trim)
}

fn evaluate(data: DataProxy<'_, '_>, path: &ReferencePath) -> Result<Resolution, ProxyError> {
    let mut current = match &path.root_args {
        Some(args) => data.call(&path.root, args)?,
        None => data.get(&path.root)?,
    };
    for segment in &path.segments {
        current = step(data, current, segment)?;
    }
    Ok(current)
}

fn step(data: DataProxy<'_, '_>, current: Resolution, segment: &Segment) -> Result<Resolution, ProxyError> {
    match (current, segment) {
        (Resolution::Accessor(kind), Segment::Member { name, args }) => data.member(&kind, name, args.as_deref()),
        (Resolution::Accessor(kind), Segment::Index(Key::Name(name))) => data.member(&kind, name, None),
        (Resolution::Accessor(_), Segment::Index(Key::Position(index))) => Err(ProxyError::invalid_reference(
            &index.to_string(),
            "accessors cannot be indexed by position",
        )),
        (Resolution::Value(_), Segment::Member { name, args: Some(_) }) => {
            Err(ProxyError::invalid_reference(name, format!("'{name}' is not callable")))
        }
        (Resolution::Value(value), Segment::Member { name, args: None }) => Ok(value.get(name).into()),
        (Resolution::Value(value), Segment::Index(Key::Name(name))) => Ok(value.get(name).into()),
        (Resolution::Value(value), Segment::Index(Key::Position(index))) => Ok(value.index(*index).into()),
    }
}

/// Parses a reference path; the error is a human-readable reason.
pub(crate) fn parse_reference(text: &str) -> Result<ReferencePath, String> {
    let mut parser = Parser { text, position: 0 };
    let path = parser.reference()?;
    parser.skip_whitespace();
    if let Some(unexpected) = parser.peek() {
        return Err(format!("unexpected '{unexpected}' at offset {}", parser.position));
    }
    Ok(path)
}

struct Parser<'t> {
    text: &'t str,
    position: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let next = self.peek()?;
        self.position += next.len_utf8();
        Some(next)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        if self.eat(expected) {
            return Ok(());
        }
        match self.peek() {
            Some(found) => Err(format!("expected '{expected}' but found '{found}' at offset {}", self.position)),
            None => Err(format!("expected '{expected}' but the reference ended")),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn identifier(&mut self) -> &str {
        let start = self.position;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        &self.text[start..self.position]
    }

    fn reference(&mut self) -> Result<ReferencePath, String> {
        self.skip_whitespace();
        let root = if self.eat('$') {
            format!("${}", self.identifier())
        } else {
            let name = self.identifier();
            if name.is_empty() {
                return Err("a reference must start with '$' or a name".to_string());
            }
            name.to_string()
        };
        let root_args = self.call_arguments()?;

        let mut segments = Vec::new();
        loop {
            if self.eat('.') {
                let name = self.identifier().to_string();
                if name.is_empty() {
                    return Err(format!("expected a member name after '.' at offset {}", self.position));
                }
                let args = self.call_arguments()?;
                segments.push(Segment::Member { name, args });
            } else if self.eat('[') {
                self.skip_whitespace();
                let key = match self.literal()? {
                    Value::String(name) => Key::Name(name),
                    Value::Number(number) => number
                        .as_u64()
                        .and_then(|index| usize::try_from(index).ok())
                        .map(Key::Position)
                        .ok_or_else(|| format!("index {number} is not a non-negative integer"))?,
                    other => return Err(format!("{other} cannot be used as an index")),
                };
                self.skip_whitespace();
                self.expect(']')?;
                segments.push(Segment::Index(key));
            } else {
                break;
            }
        }

        Ok(ReferencePath {
            root,
            root_args,
            segments,
        })
    }

    fn call_arguments(&mut self) -> Result<Option<Vec<Value>>, String> {
        if !self.eat('(') {
            return Ok(None);
        }
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.eat(')') {
            return Ok(Some(args));
        }
        loop {
            self.skip_whitespace();
            args.push(self.literal()?);
            self.skip_whitespace();
            if self.eat(')') {
                return Ok(Some(args));
            }
            self.expect(',')?;
        }
    }

    fn literal(&mut self) -> Result<Value, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.string_body(quote).map(Value::String)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.position;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
                {
                    self.bump();
                }
                let token = &self.text[start..self.position];
                serde_json::from_str::<Value>(token).map_err(|_| format!("'{token}' is not a number"))
            }
            Some(c) if c.is_alphabetic() => match self.identifier() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                other => Err(format!("unsupported argument '{other}'; use a quoted string or a number")),
            },
            Some(found) => Err(format!("unexpected '{found}' at offset {}", self.position)),
            None => Err("the reference ended inside an argument list".to_string()),
        }
    }

    fn string_body(&mut self, quote: char) -> Result<String, String> {
        let mut body = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".to_string()),
                Some(c) if c == quote => return Ok(body),
                Some('\\') => match self.bump() {
                    Some('n') => body.push('\n'),
                    Some('t') => body.push('\t'),
                    Some(escaped) => body.push(escaped),
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) => body.push(c),
            }
        }
    }
}
