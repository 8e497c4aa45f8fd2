//! Placeholder templates evaluated against component state.
//!
//! Supported actions:
//!
//! | Action | Meaning |
//! |---|---|
//! | `{{.Key}}`, `{{.a.b}}`, `{{.}}` | print a scalar value, HTML-escaped |
//! | `{{if .X}} … {{else}} … {{end}}` | conditional on truthiness |
//! | `{{range .Items}} … {{else}} … {{end}}` | iterate a list (or map values); dot is the element |
//! | `{{/* … */}}` | comment |
//!
//! `{{- ` and ` -}}` trim the whitespace on that side of the action.
//! A missing map key prints nothing and is falsy.

use crate::error::RenderError;
use sigma_types::{StateMap, StateValue};
use std::fmt;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Print(FieldPath),
    If {
        cond: FieldPath,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        over: FieldPath,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Dotted field path; empty means the current value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldPath(Vec<String>);

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for segment in &self.0 {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Action(Action),
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Print(FieldPath),
    If(FieldPath),
    Range(FieldPath),
    Else,
    End,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    Else,
    End,
}

/// Where field lookups start: the component's state, or a nested value.
#[derive(Clone, Copy)]
enum Dot<'a> {
    Root(&'a StateMap),
    Value(&'a StateValue),
}

impl Template {
    /// Parse `source`. `name` identifies the template in error messages.
    pub fn parse(name: &str, source: &str) -> Result<Self, RenderError> {
        let parser = Parser {
            name,
            tokens: lex(name, source)?,
            pos: 0,
        };
        parser.parse()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against `state`. Output is all-or-nothing.
    pub fn render(&self, state: &StateMap) -> Result<String, RenderError> {
        let mut out = String::new();
        self.exec(&self.nodes, Dot::Root(state), &mut out)?;
        Ok(out)
    }

    fn exec(&self, nodes: &[Node], dot: Dot<'_>, out: &mut String) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Print(path) => match self.resolve(path, dot)? {
                    None => {}
                    Some(Dot::Value(value)) if value.is_scalar() => {
                        escape_html(&value.to_string(), out);
                    }
                    Some(other) => {
                        return Err(RenderError::Unprintable {
                            template: self.name.clone(),
                            path: path.to_string(),
                            kind: kind_of(other),
                        });
                    }
                },
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let truthy = match self.resolve(cond, dot)? {
                        None => false,
                        Some(Dot::Root(map)) => !map.is_empty(),
                        Some(Dot::Value(value)) => value.is_truthy(),
                    };
                    let branch = if truthy { then } else { otherwise };
                    self.exec(branch, dot, out)?;
                }
                Node::Range {
                    over,
                    body,
                    otherwise,
                } => {
                    let items: Vec<&StateValue> = match self.resolve(over, dot)? {
                        None => Vec::new(),
                        Some(Dot::Root(map)) => map.values().collect(),
                        Some(Dot::Value(StateValue::List(items))) => items.iter().collect(),
                        Some(Dot::Value(StateValue::Map(map))) => map.values().collect(),
                        Some(Dot::Value(scalar)) => {
                            return Err(RenderError::NotIterable {
                                template: self.name.clone(),
                                path: over.to_string(),
                                kind: scalar.kind(),
                            });
                        }
                    };
                    if items.is_empty() {
                        self.exec(otherwise, dot, out)?;
                    }
                    for item in items {
                        self.exec(body, Dot::Value(item), out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve<'a>(&self, path: &FieldPath, dot: Dot<'a>) -> Result<Option<Dot<'a>>, RenderError> {
        let mut current = dot;
        for field in &path.0 {
            let map = match current {
                Dot::Root(map) => map,
                Dot::Value(StateValue::Map(map)) => map,
                Dot::Value(other) => {
                    return Err(RenderError::NotAMap {
                        template: self.name.clone(),
                        field: field.clone(),
                        kind: other.kind(),
                    });
                }
            };
            match map.get(field) {
                Some(value) => current = Dot::Value(value),
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

fn kind_of(dot: Dot<'_>) -> &'static str {
    match dot {
        Dot::Root(_) => "map",
        Dot::Value(value) => value.kind(),
    }
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

fn parse_error(name: &str, message: impl Into<String>) -> RenderError {
    RenderError::Parse {
        template: name.to_string(),
        message: message.into(),
    }
}

/// Split source into text and actions, applying trim markers.
fn lex(name: &str, source: &str) -> Result<Vec<Token>, RenderError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(start) = rest.find(OPEN) {
        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or_else(|| parse_error(name, "unclosed action"))?;
        let mut inner = &after_open[..end];

        if let Some(stripped) = inner.strip_prefix("- ") {
            text = text.trim_end();
            inner = stripped;
        }
        trim_next = false;
        if let Some(stripped) = inner.strip_suffix(" -") {
            trim_next = true;
            inner = stripped;
        }

        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }
        tokens.push(Token::Action(parse_action(name, inner.trim())?));
        rest = &after_open[end + CLOSE.len()..];
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_string()));
    }
    Ok(tokens)
}

fn parse_action(name: &str, action: &str) -> Result<Action, RenderError> {
    if action.starts_with("/*") {
        return if action.ends_with("*/") && action.len() >= 4 {
            Ok(Action::Comment)
        } else {
            Err(parse_error(name, "unclosed comment"))
        };
    }

    let words: Vec<&str> = action.split_whitespace().collect();
    match words.as_slice() {
        [] => Err(parse_error(name, "missing value for command")),
        ["else"] => Ok(Action::Else),
        ["end"] => Ok(Action::End),
        ["if", path] => Ok(Action::If(parse_path(name, path)?)),
        ["range", path] => Ok(Action::Range(parse_path(name, path)?)),
        ["if" | "range", ..] => Err(parse_error(
            name,
            format!("{} expects exactly one field", words[0]),
        )),
        [path] if path.starts_with('.') => Ok(Action::Print(parse_path(name, path)?)),
        _ => Err(parse_error(name, format!("unsupported action \"{}\"", action))),
    }
}

fn parse_path(name: &str, raw: &str) -> Result<FieldPath, RenderError> {
    if raw == "." {
        return Ok(FieldPath(Vec::new()));
    }
    let Some(body) = raw.strip_prefix('.') else {
        return Err(parse_error(name, format!("expected field, found \"{}\"", raw)));
    };
    let mut segments = Vec::new();
    for segment in body.split('.') {
        let valid = !segment.is_empty()
            && segment.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid {
            return Err(parse_error(name, format!("bad field name in \"{}\"", raw)));
        }
        segments.push(segment.to_string());
    }
    Ok(FieldPath(segments))
}

struct Parser<'a> {
    name: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<Template, RenderError> {
        let (nodes, stop) = self.parse_nodes()?;
        match stop {
            Stop::Eof => Ok(Template {
                name: self.name.to_string(),
                nodes,
            }),
            Stop::Else => Err(parse_error(self.name, "unexpected {{else}}")),
            Stop::End => Err(parse_error(self.name, "unexpected {{end}}")),
        }
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Stop), RenderError> {
        let mut nodes = Vec::new();
        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Action(Action::Comment) => {}
                Token::Action(Action::Print(path)) => nodes.push(Node::Print(path)),
                Token::Action(Action::Else) => return Ok((nodes, Stop::Else)),
                Token::Action(Action::End) => return Ok((nodes, Stop::End)),
                Token::Action(Action::If(cond)) => {
                    let (then, otherwise) = self.parse_block("if")?;
                    nodes.push(Node::If {
                        cond,
                        then,
                        otherwise,
                    });
                }
                Token::Action(Action::Range(over)) => {
                    let (body, otherwise) = self.parse_block("range")?;
                    nodes.push(Node::Range {
                        over,
                        body,
                        otherwise,
                    });
                }
            }
        }
        Ok((nodes, Stop::Eof))
    }

    /// Body and optional else-branch of a block, through its `{{end}}`.
    fn parse_block(&mut self, keyword: &str) -> Result<(Vec<Node>, Vec<Node>), RenderError> {
        let (body, stop) = self.parse_nodes()?;
        match stop {
            Stop::End => Ok((body, Vec::new())),
            Stop::Else => {
                let (otherwise, stop) = self.parse_nodes()?;
                match stop {
                    Stop::End => Ok((body, otherwise)),
                    Stop::Else => Err(parse_error(
                        self.name,
                        format!("multiple {{{{else}}}} in {}", keyword),
                    )),
                    Stop::Eof => Err(parse_error(
                        self.name,
                        format!("unexpected EOF in {}", keyword),
                    )),
                }
            }
            Stop::Eof => Err(parse_error(
                self.name,
                format!("unexpected EOF in {}", keyword),
            )),
        }
    }
}
