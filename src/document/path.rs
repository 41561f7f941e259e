//! Dotted/bracketed path syntax shared by templates and rule expressions
//!
//! `tests.login.results.200.json.items[0]["display-name"]`
//!
//! Lookups never fail on missing data: an absent key, an out-of-range index or
//! a step through a scalar all yield `None`.

use serde_json::Value as JsonValue;

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name` or `["name"]`; digit-only keys also index arrays
    Key(String),
    /// `[3]`
    Index(usize),
}

impl Segment {
    pub fn key(name: &str) -> Self {
        Segment::Key(name.to_string())
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Character cursor over an expression or template source
#[derive(Debug)]
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Identifier made of ASCII letters, digits, `_` and `-`
    pub fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_char(c)) {
            self.bump();
        }
        if self.pos == start {
            None
        } else {
            Some(&self.src[start..self.pos])
        }
    }

    /// Single- or double-quoted string with backslash escapes.
    /// The cursor must sit on the opening quote.
    pub fn quoted(&mut self) -> Result<String, String> {
        let quote = match self.bump() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(format!("expected a quoted string at offset {}", self.pos)),
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string literal".to_string()),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err("unterminated string literal".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    /// Zero or more `.name` / `[index]` / `["key"]` accessors
    pub fn segments(&mut self) -> Result<Vec<Segment>, String> {
        let mut segments = Vec::new();
        loop {
            if self.eat('.') {
                match self.ident() {
                    Some(name) => segments.push(Segment::key(name)),
                    None => return Err(format!("expected a name after '.' at offset {}", self.pos)),
                }
            } else if self.eat('[') {
                self.skip_ws();
                let segment = match self.peek() {
                    Some('"' | '\'') => Segment::Key(self.quoted()?),
                    Some(c) if c.is_ascii_digit() => {
                        let start = self.pos;
                        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                            self.bump();
                        }
                        let digits = &self.src[start..self.pos];
                        let index = digits
                            .parse::<usize>()
                            .map_err(|e| format!("invalid index {}: {}", digits, e))?;
                        Segment::Index(index)
                    }
                    _ => return Err(format!("expected an index or quoted key at offset {}", self.pos)),
                };
                self.skip_ws();
                if !self.eat(']') {
                    return Err(format!("expected ']' at offset {}", self.pos));
                }
                segments.push(segment);
            } else {
                return Ok(segments);
            }
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Parse a complete path such as `env.HOME` or `items[0].id`
pub fn parse_path(input: &str) -> Result<Vec<Segment>, String> {
    let mut cursor = Cursor::new(input.trim());
    let root = cursor
        .ident()
        .ok_or_else(|| format!("path must start with a name: {:?}", input))?;
    let mut segments = vec![Segment::key(root)];
    segments.extend(cursor.segments()?);
    if !cursor.at_end() {
        return Err(format!("unexpected {:?} in path {:?}", cursor.rest(), input));
    }
    Ok(segments)
}

/// Follow `segments` through `value`
pub fn lookup<'v>(value: &'v JsonValue, segments: &[Segment]) -> Option<&'v JsonValue> {
    segments.iter().try_fold(value, |current, segment| step(current, segment))
}

/// One step of [`lookup`]
pub fn step<'v>(value: &'v JsonValue, segment: &Segment) -> Option<&'v JsonValue> {
    match (value, segment) {
        (JsonValue::Object(map), Segment::Key(k)) => map.get(k),
        (JsonValue::Object(map), Segment::Index(i)) => map.get(&i.to_string()),
        (JsonValue::Array(items), Segment::Index(i)) => items.get(*i),
        (JsonValue::Array(items), Segment::Key(k)) => k.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Like [`lookup`] but yields an owned `null` for anything unresolved
pub fn lookup_or_null(value: &JsonValue, segments: &[Segment]) -> JsonValue {
    lookup(value, segments).cloned().unwrap_or(JsonValue::Null)
}
