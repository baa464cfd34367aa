//! Parser for tool result payloads
//!
//! The agent runtime logs tool results either as JSON or as a Python
//! literal repr (single-quoted strings, `True`/`False`/`None`, tuples).
//! Both are accepted and converted to a [`serde_json::Value`].

use serde_json::{Map, Number, Value};

/// Deepest container nesting accepted, matching serde_json's recursion limit
const MAX_DEPTH: usize = 128;

/// Parse a JSON or Python-literal payload.
///
/// Returns `None` when the text is neither; trailing garbage after the
/// first complete value is rejected.
pub fn parse_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let mut parser = LiteralParser::new(trimmed);
    let value = parser.value()?;
    parser.skip_whitespace();
    parser.at_end().then_some(value)
}

struct LiteralParser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            depth: 0,
        }
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Option<()> {
        self.skip_whitespace();
        (self.bump()? == expected).then_some(())
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_whitespace();
        match self.peek()? {
            '[' => self.nested(|p| p.sequence('[', ']')),
            '(' => self.nested(|p| p.sequence('(', ')')),
            '{' => self.nested(Self::mapping),
            '\'' | '"' => self.string().map(Value::String),
            c if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() => self.keyword(),
            _ => None,
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Option<Value>) -> Option<Value> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn sequence(&mut self, open: char, close: char) -> Option<Value> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek()? == close {
                self.bump();
                return Some(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.bump()? {
                ',' => continue,
                c if c == close => return Some(Value::Array(items)),
                _ => return None,
            }
        }
    }

    fn mapping(&mut self) -> Option<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek()? == '}' {
                self.bump();
                return Some(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.bump()? {
                ',' => continue,
                '}' => return Some(Value::Object(map)),
                _ => return None,
            }
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'x' => out.push(self.hex_escape(2)?),
                    'u' => out.push(self.hex_escape(4)?),
                    'U' => out.push(self.hex_escape(8)?),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            code = code * 16 + self.bump()?.to_digit(16)?;
        }
        char::from_u32(code)
    }

    fn number(&mut self) -> Option<Value> {
        let (start, _) = *self.chars.peek()?;
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                end = idx + c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        if let Ok(n) = text.parse::<i64>() {
            return Some(Value::Number(n.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    }

    fn keyword(&mut self) -> Option<Value> {
        let mut word = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            word.extend(self.bump());
        }
        match word.as_str() {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" => Some(Value::Null),
            _ => None,
        }
    }
}
