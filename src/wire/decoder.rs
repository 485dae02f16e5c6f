//! # Wire Decoder
//!
//! Parses wire text back into `Value` trees, preserving map key order.

use super::value::Value;
use crate::error::DecodeError;

/// Nesting limit for maps and lists
const MAX_DEPTH: usize = 64;

/// Decode wire text into a value
///
/// # Errors
///
/// Returns `DecodeError` with the byte offset of the first problem if:
/// - The input is not a single well-formed value (trailing data included)
/// - A string is not valid UTF-8 or has a bad escape
/// - Nesting exceeds 64 levels
///
/// # Examples
///
/// ```
/// use cellprobe::wire::{decode, Value};
///
/// let v = decode(br#"{"b":1,"a":[true,null]}"#).unwrap();
/// assert_eq!(v.keys(), vec!["b", "a"]);
/// assert_eq!(v.get("b"), Some(&Value::Integer(1)));
/// ```
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if parser.pos != input.len() {
        return Err(parser.error("trailing data"));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> DecodeError {
        DecodeError::new(message, self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), DecodeError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn parse_literal(&mut self, literal: &str, value: Value) -> Result<Value, DecodeError> {
        if self.input[self.pos..].starts_with(literal.as_bytes()) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(self.error("invalid literal"))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b'{') => self.parse_map(depth),
            Some(b'[') => self.parse_list(depth),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn parse_map(&mut self, depth: usize) -> Result<Value, DecodeError> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Map(entries));
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            entries.push((key, value));
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Map(entries));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_list(&mut self, depth: usize) -> Result<Value, DecodeError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::List(items));
        }
        loop {
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Value, DecodeError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' | b'-' | b'+' => {}
                b'.' | b'e' | b'E' => is_float = true,
                _ => break,
            }
            self.pos += 1;
        }
        // Only ASCII bytes were consumed above
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| DecodeError::new("invalid number", start))?;

        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
        }
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| DecodeError::new("invalid number", start))
    }

    fn parse_string(&mut self) -> Result<String, DecodeError> {
        self.expect(b'"')?;
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => self.parse_escape(&mut buf)?,
                b if b < 0x20 => return Err(DecodeError::new("control character in string", self.pos - 1)),
                b => buf.push(b),
            }
        }
        String::from_utf8(buf).map_err(|_| self.error("invalid UTF-8 in string"))
    }

    fn parse_escape(&mut self, buf: &mut Vec<u8>) -> Result<(), DecodeError> {
        let Some(b) = self.peek() else {
            return Err(self.error("unterminated escape"));
        };
        self.pos += 1;
        let c = match b {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => self.parse_unicode_escape()?,
            _ => return Err(DecodeError::new("invalid escape", self.pos - 1)),
        };
        let mut tmp = [0u8; 4];
        buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
        Ok(())
    }

    fn parse_hex4(&mut self) -> Result<u32, DecodeError> {
        let end = self.pos + 4;
        let digits = self
            .input
            .get(self.pos..end)
            .and_then(|d| std::str::from_utf8(d).ok())
            .and_then(|d| u32::from_str_radix(d, 16).ok())
            .ok_or_else(|| self.error("invalid \\u escape"))?;
        self.pos = end;
        Ok(digits)
    }

    fn parse_unicode_escape(&mut self) -> Result<char, DecodeError> {
        let first = self.parse_hex4()?;
        let code = if (0xD800..0xDC00).contains(&first) {
            // High surrogate must be followed by \uDC00..\uDFFF
            if !self.input[self.pos..].starts_with(b"\\u") {
                return Err(self.error("unpaired surrogate"));
            }
            self.pos += 2;
            let second = self.parse_hex4()?;
            if !(0xDC00..0xE000).contains(&second) {
                return Err(self.error("unpaired surrogate"));
            }
            0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
        } else {
            first
        };
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }
}
