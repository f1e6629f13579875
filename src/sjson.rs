//! Minimal reader/writer for the game's SJSON dialect: an implicit top-level
//! map of `Key = Value` pairs with `//` and `/* */` comments, optional commas,
//! and bare or quoted keys. Only the constructs the tracked documents actually
//! use are supported; this is deliberately not a general-purpose parser.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A parsed document node. Maps preserve field order, matching the on-disk
/// layout of the source files.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Map(IndexMap<String, Value>),
    Seq(Vec<Value>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Field lookup on map nodes; `None` for everything else.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SjsonError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for SjsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

pub fn parse(text: &str) -> Result<Value, SjsonError> {
    let mut parser = Parser {
        bytes: text.as_bytes(),
        pos: 0,
        line: 1,
    };
    parser.skip_noise()?;
    // Documents may carry explicit braces around the top-level map, but the
    // game's files usually omit them.
    let map = if parser.peek() == Some(b'{') {
        parser.bump();
        let map = parser.parse_map_body(Some(b'}'))?;
        parser.expect(b'}')?;
        map
    } else {
        parser.parse_map_body(None)?
    };
    parser.skip_noise()?;
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("trailing content after document"));
    }
    Ok(Value::Map(map))
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> SjsonError {
        SjsonError {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn expect(&mut self, wanted: u8) -> Result<(), SjsonError> {
        match self.bump() {
            Some(b) if b == wanted => Ok(()),
            Some(b) => Err(self.error(format!(
                "expected '{}', found '{}'",
                wanted as char, b as char
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", wanted as char))),
        }
    }

    /// Skip whitespace, separator commas and both comment styles.
    fn skip_noise(&mut self) -> Result<(), SjsonError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() || b == b',' => {
                    self.bump();
                }
                Some(b'/') => match self.bytes.get(self.pos + 1) {
                    Some(b'/') => {
                        while let Some(b) = self.peek() {
                            if b == b'\n' {
                                break;
                            }
                            self.bump();
                        }
                    }
                    Some(b'*') => {
                        self.bump();
                        self.bump();
                        loop {
                            match self.bump() {
                                Some(b'*') if self.peek() == Some(b'/') => {
                                    self.bump();
                                    break;
                                }
                                Some(_) => {}
                                None => return Err(self.error("unterminated block comment")),
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn parse_map_body(
        &mut self,
        closing: Option<u8>,
    ) -> Result<IndexMap<String, Value>, SjsonError> {
        let mut map = IndexMap::new();
        loop {
            self.skip_noise()?;
            match self.peek() {
                None => {
                    if closing.is_some() {
                        return Err(self.error("unterminated map"));
                    }
                    return Ok(map);
                }
                Some(b) if Some(b) == closing => return Ok(map),
                _ => {}
            }
            let key = self.parse_key()?;
            self.skip_noise()?;
            self.expect(b'=')?;
            self.skip_noise()?;
            let value = self.parse_value()?;
            map.insert(key, value);
        }
    }

    fn parse_key(&mut self) -> Result<String, SjsonError> {
        match self.peek() {
            Some(b'"') => self.parse_string(),
            Some(b) if is_bare_char(b) => Ok(self.parse_bare_word()),
            Some(b) => Err(self.error(format!("unexpected '{}' where a key was expected", b as char))),
            None => Err(self.error("unexpected end of input where a key was expected")),
        }
    }

    fn parse_value(&mut self) -> Result<Value, SjsonError> {
        match self.peek() {
            Some(b'{') => {
                self.bump();
                let map = self.parse_map_body(Some(b'}'))?;
                self.expect(b'}')?;
                Ok(Value::Map(map))
            }
            Some(b'[') => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    self.skip_noise()?;
                    match self.peek() {
                        Some(b']') => {
                            self.bump();
                            return Ok(Value::Seq(items));
                        }
                        Some(_) => items.push(self.parse_value()?),
                        None => return Err(self.error("unterminated sequence")),
                    }
                }
            }
            Some(b'"') => Ok(Value::Str(self.parse_string()?)),
            Some(b) if is_bare_char(b) => {
                let word = self.parse_bare_word();
                Ok(classify_bare_word(&word, self)?)
            }
            Some(b) => Err(self.error(format!("unexpected '{}' where a value was expected", b as char))),
            None => Err(self.error("unexpected end of input where a value was expected")),
        }
    }

    fn parse_string(&mut self) -> Result<String, SjsonError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b) => {
                        return Err(self.error(format!("unsupported escape '\\{}'", b as char)))
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(b) if b < 0x80 => out.push(b as char),
                Some(b) => {
                    // Re-assemble a multi-byte UTF-8 sequence byte by byte.
                    let start = self.pos - 1;
                    let len = utf8_len(b);
                    for _ in 1..len {
                        self.bump();
                    }
                    match std::str::from_utf8(&self.bytes[start..self.pos]) {
                        Ok(s) => out.push_str(s),
                        Err(_) => return Err(self.error("invalid UTF-8 in string")),
                    }
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_bare_word(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_bare_char(b) {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }
}

fn is_bare_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'+' | b'.')
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b >= 0xf0 => 4,
        b if b >= 0xe0 => 3,
        _ => 2,
    }
}

fn classify_bare_word(word: &str, parser: &Parser<'_>) -> Result<Value, SjsonError> {
    match word {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    let numeric_lead = word
        .trim_start_matches(['-', '+'])
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.');
    if numeric_lead {
        if !word.contains('.') {
            if let Ok(i) = word.parse::<i64>() {
                return Ok(Value::Int(i));
            }
        }
        return match word.parse::<f64>() {
            Ok(f) => Ok(Value::Float(f)),
            Err(_) => Err(parser.error(format!("malformed number '{word}'"))),
        };
    }
    // Bare identifiers occasionally appear as enum-like string values.
    Ok(Value::Str(word.to_string()))
}

/// Serialize a document back to canonical SJSON text: the top-level map is
/// written without braces, fields one per line, tab-indented.
pub fn to_string(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Map(map) => write_map_body(&mut out, map, 0),
        other => write_value(&mut out, other, 0),
    }
    out
}

fn write_map_body(out: &mut String, map: &IndexMap<String, Value>, indent: usize) {
    for (key, value) in map {
        push_indent(out, indent);
        write_key(out, key);
        out.push_str(" = ");
        write_value(out, value, indent);
        out.push('\n');
    }
}

fn write_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Map(map) => {
            out.push_str("{\n");
            write_map_body(out, map, indent + 1);
            push_indent(out, indent);
            out.push('}');
        }
        Value::Seq(items) => {
            out.push_str("[\n");
            for item in items {
                push_indent(out, indent + 1);
                write_value(out, item, indent + 1);
                out.push('\n');
            }
            push_indent(out, indent);
            out.push(']');
        }
        Value::Str(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => {
            // Keep floats recognizable as floats on re-parse.
            if f.fract() == 0.0 && f.is_finite() {
                out.push_str(&format!("{f:.1}"));
            } else {
                out.push_str(&format!("{f}"));
            }
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    }
}

fn write_key(out: &mut String, key: &str) {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if bare {
        out.push_str(key);
    } else {
        out.push('"');
        out.push_str(key);
        out.push('"');
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push('\t');
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Str(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an SJSON-compatible value")
            }

            fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
                Ok(Value::Bool(b))
            }

            fn visit_i64<E: de::Error>(self, i: i64) -> Result<Value, E> {
                Ok(Value::Int(i))
            }

            fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
                i64::try_from(u)
                    .map(Value::Int)
                    .map_err(|_| E::custom("integer out of range"))
            }

            fn visit_f64<E: de::Error>(self, f: f64) -> Result<Value, E> {
                Ok(Value::Float(f))
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
                Ok(Value::Str(s.to_string()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Seq(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
                let mut map = IndexMap::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
