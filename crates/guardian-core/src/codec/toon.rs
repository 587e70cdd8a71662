//! TOON (Token-Oriented Object Notation) codec.
//!
//! Supports the subset models actually emit:
//!
//! ```text
//! user:
//!   id: 7
//!   name: Ada
//! tags[2]: admin,ops
//! orders[2]{sku,qty}:
//!   A-1,2
//!   B-9,1
//! notes[2]:
//!   - first
//!   - kind: call
//!     at: "09:30"
//! ```
//!
//! Indentation is two spaces. Declared array lengths are checked. Strings that
//! would be ambiguous bare are JSON-quoted.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::{Codec, CodecError};

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"^-?(?:0|[1-9][0-9]*)(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?$").unwrap();
    static ref BARE_KEY: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap();
}

const INDENT: &str = "  ";

/// Default TOON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToonCodec;

impl ToonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Parse TOON text into a JSON value.
    pub fn decode_value(&self, text: &str) -> Result<Value, CodecError> {
        let lines = tokenize(text)?;
        let Some(first) = lines.first().copied() else {
            return Ok(Value::Object(Map::new()));
        };
        if first.depth != 0 {
            return Err(CodecError::syntax(first.number, "document must start at column 0"));
        }

        let mut parser = Parser { lines, pos: 0 };
        let value = match parse_header(first.text, first.number)? {
            Some(header) if header.key.is_none() => {
                parser.pos += 1;
                parser.parse_array(header, 0, first.number)?
            }
            None if parser.lines.len() == 1 => {
                parser.pos += 1;
                parse_scalar(first.text, first.number)?
            }
            _ => parser.parse_object(0)?,
        };

        if let Some(line) = parser.peek() {
            return Err(CodecError::syntax(line.number, "unexpected indentation"));
        }
        Ok(value)
    }

    /// Render a JSON value as TOON.
    pub fn encode_value(&self, value: &Value) -> String {
        let mut out = Vec::new();
        match value {
            Value::Object(map) => write_object(&mut out, 0, map),
            Value::Array(items) => write_array(&mut out, "", 0, "", items),
            scalar => out.push(encode_scalar(scalar)),
        }
        out.join("\n")
    }
}

impl Codec for ToonCodec {
    fn name(&self) -> &'static str {
        "toon"
    }

    fn decode(&self, text: &str) -> Result<String, CodecError> {
        let value = self.decode_value(text)?;
        serde_json::to_string(&value).map_err(|e| CodecError::InvalidJson(e.to_string()))
    }

    fn encode(&self, text: &str) -> Result<String, CodecError> {
        let value: Value = serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
        Ok(self.encode_value(&value))
    }
}

// =============================================================================
// DECODING
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    depth: usize,
    text: &'a str,
}

fn tokenize(text: &str) -> Result<Vec<Line<'_>>, CodecError> {
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let number = idx + 1;
        let raw = raw.trim_end();
        if raw.is_empty() {
            continue;
        }
        let content = raw.trim_start_matches(' ');
        if content.starts_with('\t') {
            return Err(CodecError::syntax(number, "tabs are not allowed in indentation"));
        }
        let spaces = raw.len() - content.len();
        if spaces % INDENT.len() != 0 {
            return Err(CodecError::syntax(
                number,
                format!("indentation of {} spaces is not a multiple of {}", spaces, INDENT.len()),
            ));
        }
        lines.push(Line {
            number,
            depth: spaces / INDENT.len(),
            text: content,
        });
    }
    Ok(lines)
}

/// A `key[N]{fields}: rest` line, every part but the colon optional.
#[derive(Debug)]
struct Header<'a> {
    key: Option<String>,
    len: Option<usize>,
    fields: Option<Vec<String>>,
    rest: &'a str,
}

/// Byte index of the closing quote of a string starting at `s[0] == '"'`.
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

/// First occurrence of `target` outside double quotes.
fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == target && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split on commas outside quotes; each part trimmed.
fn split_values(s: &str, number: usize) -> Result<Vec<&str>, CodecError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut rest = s;
    loop {
        match find_unquoted(rest, ',') {
            Some(i) => {
                parts.push(rest[..i].trim());
                rest = &rest[i + 1..];
            }
            None => {
                parts.push(rest.trim());
                break;
            }
        }
    }
    for part in &parts {
        if part.starts_with('"') && closing_quote(part) != Some(part.len() - 1) {
            return Err(CodecError::syntax(number, format!("unterminated string {}", part)));
        }
    }
    Ok(parts)
}

fn parse_key(raw: &str, number: usize) -> Result<String, CodecError> {
    if raw.starts_with('"') {
        serde_json::from_str(raw).map_err(|e| CodecError::syntax(number, format!("invalid quoted key: {}", e)))
    } else {
        Ok(raw.to_string())
    }
}

/// Parse a header line. `Ok(None)` means the line is a bare value.
fn parse_header(text: &str, number: usize) -> Result<Option<Header<'_>>, CodecError> {
    let (key, mut rest) = if text.starts_with('"') {
        let end = closing_quote(text).ok_or_else(|| CodecError::syntax(number, "unterminated quoted key"))?;
        (Some(parse_key(&text[..=end], number)?), &text[end + 1..])
    } else if text.starts_with('[') {
        (None, text)
    } else {
        let end = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'))
            .unwrap_or(text.len());
        if end == 0 {
            return Ok(None);
        }
        (Some(text[..end].to_string()), &text[end..])
    };

    let mut len = None;
    let mut fields = None;
    if let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return Ok(None);
        };
        let Ok(n) = inner[..close].trim().parse::<usize>() else {
            return Ok(None);
        };
        len = Some(n);
        rest = &inner[close + 1..];

        if let Some(inner) = rest.strip_prefix('{') {
            let Some(close) = find_unquoted(inner, '}') else {
                return Ok(None);
            };
            let names = split_values(&inner[..close], number)?
                .into_iter()
                .map(|name| parse_key(name, number))
                .collect::<Result<Vec<_>, _>>()?;
            if names.is_empty() {
                return Err(CodecError::syntax(number, "tabular header needs at least one field"));
            }
            fields = Some(names);
            rest = &inner[close + 1..];
        }
    }

    let Some(after_colon) = rest.strip_prefix(':') else {
        return Ok(None);
    };
    if !(after_colon.is_empty() || after_colon.starts_with(' ')) {
        return Ok(None);
    }
    if key.is_none() && len.is_none() {
        return Ok(None);
    }
    Ok(Some(Header {
        key,
        len,
        fields,
        rest: after_colon.trim(),
    }))
}

fn parse_scalar(text: &str, number: usize) -> Result<Value, CodecError> {
    let t = text.trim();
    Ok(match t {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if t.starts_with('"') => Value::String(
            serde_json::from_str(t).map_err(|e| CodecError::syntax(number, format!("invalid quoted string: {}", e)))?,
        ),
        _ if NUMBER.is_match(t) => {
            serde_json::from_str(t).map_err(|e| CodecError::syntax(number, format!("invalid number {}: {}", t, e)))?
        }
        _ => Value::String(t.to_string()),
    })
}

struct Parser<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value, CodecError> {
        let mut map = Map::new();
        while let Some(line) = self.peek() {
            if line.depth < depth {
                break;
            }
            if line.depth > depth {
                return Err(CodecError::syntax(line.number, "unexpected indentation"));
            }
            self.pos += 1;

            let header = parse_header(line.text, line.number)?.ok_or_else(|| {
                CodecError::syntax(line.number, format!("expected 'key: value', found '{}'", line.text))
            })?;
            let key = header
                .key
                .clone()
                .ok_or_else(|| CodecError::syntax(line.number, "array inside an object needs a key"))?;

            let value = if header.len.is_some() {
                self.parse_array(header, depth, line.number)?
            } else if header.rest.is_empty() {
                match self.peek() {
                    Some(next) if next.depth > depth => self.parse_object(depth + 1)?,
                    _ => Value::Object(Map::new()),
                }
            } else {
                parse_scalar(header.rest, line.number)?
            };
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    /// Parse the body of an array whose header sits at `depth`.
    fn parse_array(&mut self, header: Header<'_>, depth: usize, number: usize) -> Result<Value, CodecError> {
        let declared = header.len.unwrap_or(0);

        let items = if let Some(fields) = header.fields {
            self.parse_rows(&fields, depth)?
        } else if !header.rest.is_empty() {
            split_values(header.rest, number)?
                .into_iter()
                .map(|v| parse_scalar(v, number))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            self.parse_list_items(depth)?
        };

        if items.len() != declared {
            return Err(CodecError::LengthMismatch {
                line: number,
                declared,
                actual: items.len(),
            });
        }
        Ok(Value::Array(items))
    }

    fn parse_rows(&mut self, fields: &[String], depth: usize) -> Result<Vec<Value>, CodecError> {
        let mut rows = Vec::new();
        while let Some(line) = self.peek() {
            if line.depth <= depth {
                break;
            }
            if line.depth != depth + 1 {
                return Err(CodecError::syntax(line.number, "unexpected indentation in table"));
            }
            self.pos += 1;

            let cells = split_values(line.text, line.number)?;
            if cells.len() != fields.len() {
                return Err(CodecError::syntax(
                    line.number,
                    format!("row has {} values, header declares {}", cells.len(), fields.len()),
                ));
            }
            let mut row = Map::new();
            for (field, cell) in fields.iter().zip(cells) {
                row.insert(field.clone(), parse_scalar(cell, line.number)?);
            }
            rows.push(Value::Object(row));
        }
        Ok(rows)
    }

    fn parse_list_items(&mut self, depth: usize) -> Result<Vec<Value>, CodecError> {
        let mut items = Vec::new();
        while let Some(line) = self.peek() {
            if line.depth <= depth {
                break;
            }
            if line.depth != depth + 1 {
                return Err(CodecError::syntax(line.number, "unexpected indentation in list"));
            }
            let body = match line.text.strip_prefix("- ") {
                Some(body) => body.trim(),
                None if line.text == "-" => "",
                None => return Err(CodecError::syntax(line.number, "list items must start with '- '")),
            };

            if body.is_empty() {
                self.pos += 1;
                items.push(Value::Object(Map::new()));
                continue;
            }

            let item = match parse_header(body, line.number)? {
                None => {
                    self.pos += 1;
                    parse_scalar(body, line.number)?
                }
                Some(header) if header.key.is_none() => {
                    self.pos += 1;
                    self.parse_array(header, depth + 1, line.number)?
                }
                Some(_) => {
                    // Object item: its first field shares the hyphen line and
                    // the remaining fields sit one level deeper.
                    let field_depth = depth + 2;
                    self.lines[self.pos] = Line {
                        number: line.number,
                        depth: field_depth,
                        text: body,
                    };
                    self.parse_object(field_depth)?
                }
            };
            items.push(item);
        }
        Ok(items)
    }
}

// =============================================================================
// ENCODING
// =============================================================================

fn indent(depth: usize) -> String {
    INDENT.repeat(depth)
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn encode_key(key: &str) -> String {
    if BARE_KEY.is_match(key) {
        key.to_string()
    } else {
        Value::String(key.to_string()).to_string()
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.trim() != s
        || matches!(s, "null" | "true" | "false")
        || s.parse::<f64>().is_ok()
        || s.starts_with('-')
        || s.contains(|c: char| matches!(c, ':' | ',' | '"' | '\\' | '[' | ']' | '{' | '}') || c.is_control())
}

fn encode_scalar(value: &Value) -> String {
    match value {
        Value::String(s) if !needs_quotes(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Field names if every item is a non-empty object with the same keys in the
/// same order and only primitive values.
fn tabular_fields(items: &[Value]) -> Option<Vec<&String>> {
    let first = items.first()?.as_object()?;
    if first.is_empty() {
        return None;
    }
    let fields: Vec<&String> = first.keys().collect();
    let uniform = items.iter().all(|item| {
        item.as_object().is_some_and(|obj| {
            obj.len() == fields.len()
                && obj.iter().zip(&fields).all(|((k, v), f)| k == *f && is_primitive(v))
        })
    });
    uniform.then_some(fields)
}

fn write_object(out: &mut Vec<String>, depth: usize, map: &Map<String, Value>) {
    for (key, value) in map {
        write_field(out, &indent(depth), depth, &encode_key(key), value);
    }
}

/// Write `key: value`; `prefix` is everything before the key on this line.
fn write_field(out: &mut Vec<String>, prefix: &str, depth: usize, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push(format!("{}{}:", prefix, key));
            write_object(out, depth + 1, map);
        }
        Value::Array(items) => write_array(out, prefix, depth, key, items),
        scalar => out.push(format!("{}{}: {}", prefix, key, encode_scalar(scalar))),
    }
}

fn write_array(out: &mut Vec<String>, prefix: &str, depth: usize, key: &str, items: &[Value]) {
    let n = items.len();

    if items.iter().all(is_primitive) {
        let joined: Vec<String> = items.iter().map(encode_scalar).collect();
        if joined.is_empty() {
            out.push(format!("{}{}[0]:", prefix, key));
        } else {
            out.push(format!("{}{}[{}]: {}", prefix, key, n, joined.join(",")));
        }
        return;
    }

    if let Some(fields) = tabular_fields(items) {
        let header: Vec<String> = fields.iter().map(|f| encode_key(f)).collect();
        out.push(format!("{}{}[{}]{{{}}}:", prefix, key, n, header.join(",")));
        for item in items.iter().filter_map(Value::as_object) {
            let row: Vec<String> = item.values().map(encode_scalar).collect();
            out.push(format!("{}{}", indent(depth + 1), row.join(",")));
        }
        return;
    }

    out.push(format!("{}{}[{}]:", prefix, key, n));
    let item_prefix = format!("{}- ", indent(depth + 1));
    for item in items {
        match item {
            Value::Array(inner) => write_array(out, &item_prefix, depth + 1, "", inner),
            Value::Object(map) if map.is_empty() => out.push(format!("{}-", indent(depth + 1))),
            Value::Object(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    let line_prefix = if i == 0 { item_prefix.clone() } else { indent(depth + 2) };
                    write_field(out, &line_prefix, depth + 2, &encode_key(k), v);
                }
            }
            scalar => out.push(format!("{}{}", item_prefix, encode_scalar(scalar))),
        }
    }
}
