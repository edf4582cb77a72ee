//! Decoder for the Python literals printed by the programs `boardcom` sends to
//! the board, and encoder for the literals embedded into those programs.
//!
//! Only the grammar the generated programs actually produce is accepted:
//! `None`, `True`, `False`, integers, floats, strings, bytes, lists and
//! tuples. This is not an expression evaluator.
//!
//! **Example**
//! ```
//! use boardcom::files::literal::{decode, Literal};
//!
//! let value = decode("[('main.py', 'f', 42)]").unwrap();
//! assert_eq!(
//!     value,
//!     Literal::List(vec![Literal::Tuple(vec![
//!         Literal::Str("main.py".into()),
//!         Literal::Str("f".into()),
//!         Literal::Int(42),
//!     ])])
//! );
//! ```

use std::fmt::Write;

use thiserror::Error;

/// A decoded literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
}
impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Literal::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The items of a list or a tuple.
    pub fn as_items(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) | Literal::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

/// The input is not a literal of the supported grammar.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct DecodeError {
    pub offset: usize,
    pub message: String,
}

/// Decode a complete literal. Surrounding whitespace is ignored.
pub fn decode(input: &str) -> Result<Literal, DecodeError> {
    let mut decoder = Decoder { input, position: 0 };
    let value = decoder.value()?;
    decoder.skip_whitespace();
    if decoder.position != input.len() {
        return Err(decoder.error("trailing characters"));
    }
    Ok(value)
}

/// Decode the output of `hexlify`.
pub fn decode_hex(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let digits: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(DecodeError {
            offset: digits.len(),
            message: "odd number of hex digits".into(),
        });
    }
    digits
        .chunks(2)
        .enumerate()
        .map(|(index, pair)| match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(high), Some(low)) => Ok(high << 4 | low),
            _ => Err(DecodeError {
                offset: index * 2,
                message: "invalid hex digit".into(),
            }),
        })
        .collect()
}

/// Encode `data` as a bytes literal, `b'...'`.
pub fn encode_bytes(data: &[u8]) -> String {
    let mut literal = String::with_capacity(data.len() + 3);
    literal.push_str("b'");
    for &byte in data {
        match byte {
            b'\\' => literal.push_str("\\\\"),
            b'\'' => literal.push_str("\\'"),
            b'\n' => literal.push_str("\\n"),
            b'\r' => literal.push_str("\\r"),
            b'\t' => literal.push_str("\\t"),
            0x20..=0x7e => literal.push(byte as char),
            _ => {
                let _ = write!(literal, "\\x{:02x}", byte);
            }
        }
    }
    literal.push('\'');
    literal
}

/// Encode `text` as a string literal, `'...'`.
pub fn encode_str(text: &str) -> String {
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('\'');
    for c in text.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(literal, "\\x{:02x}", c as u32);
            }
            c => literal.push(c),
        }
    }
    literal.push('\'');
    literal
}

// =============================================================================
// Private stuff
// =============================================================================

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|value| value as u8)
}

struct Decoder<'a> {
    input: &'a str,
    position: usize,
}
impl<'a> Decoder<'a> {
    fn error(&self, message: &str) -> DecodeError {
        DecodeError {
            offset: self.position,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.position += c.len_utf8();
        }
    }

    fn value(&mut self) -> Result<Literal, DecodeError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.position += 1;
                Ok(Literal::List(self.sequence(']')?.0))
            }
            Some('(') => {
                self.position += 1;
                let (mut items, trailing_comma) = self.sequence(')')?;
                // `(x)` is just a parenthesized value, `(x,)` a tuple.
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Literal::Tuple(items))
                }
            }
            Some(quote @ '\'') | Some(quote @ '"') => {
                self.position += 1;
                Ok(Literal::Str(self.string(quote)?))
            }
            Some('b') if matches!(self.rest().as_bytes().get(1), Some(b'\'') | Some(b'"')) => {
                self.position += 1;
                let quote = self.next().unwrap_or('\'');
                Ok(Literal::Bytes(self.bytes(quote)?))
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(_) => self.keyword(),
        }
    }

    /// Comma separated values up to `close`. Also tells whether the last item
    /// was followed by a comma.
    fn sequence(&mut self, close: char) -> Result<(Vec<Literal>, bool), DecodeError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.position += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.next() {
                Some(',') => trailing_comma = true,
                Some(c) if c == close => return Ok((items, false)),
                Some(_) => {
                    self.position -= 1;
                    return Err(self.error(&format!("expected `,` or `{}`", close)));
                }
                None => return Err(self.error("unterminated sequence")),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, DecodeError> {
        let mut value = String::new();
        loop {
            match self.next() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => {
                    let c = match self.next() {
                        Some('x') => char::from(self.hex_escape(2)? as u8),
                        Some('u') => std::char::from_u32(self.hex_escape(4)?)
                            .ok_or_else(|| self.error("invalid unicode escape"))?,
                        Some(c) => simple_escape(c).ok_or_else(|| self.error("unknown escape"))?,
                        None => return Err(self.error("unterminated string")),
                    };
                    value.push(c);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn bytes(&mut self, quote: char) -> Result<Vec<u8>, DecodeError> {
        let mut value = Vec::new();
        loop {
            match self.next() {
                None => return Err(self.error("unterminated bytes")),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => match self.next() {
                    Some('x') => value.push(self.hex_escape(2)? as u8),
                    Some(c) => {
                        let c = simple_escape(c).ok_or_else(|| self.error("unknown escape"))?;
                        value.push(c as u8);
                    }
                    None => return Err(self.error("unterminated bytes")),
                },
                Some(c) if c.is_ascii() => value.push(c as u8),
                Some(_) => return Err(self.error("non-ASCII character in bytes")),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<u32, DecodeError> {
        let rest = self.rest();
        let hex = rest
            .get(..digits)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("invalid hex escape"))?;
        let value = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.position += digits;
        Ok(value)
    }

    fn number(&mut self) -> Result<Literal, DecodeError> {
        let start = self.position;
        let rest = self.rest();
        let length = rest
            .char_indices()
            .find(|&(index, c)| {
                !(c.is_ascii_digit()
                    || c == '.'
                    || c == 'e'
                    || c == 'E'
                    || ((c == '-' || c == '+') && (index == 0 || rest[..index].ends_with(&['e', 'E'][..]))))
            })
            .map_or(rest.len(), |(index, _)| index);
        let text = &rest[..length];
        self.position += length;

        if text.contains(&['.', 'e', 'E'][..]) {
            text.parse::<f64>().map(Literal::Float).map_err(|_| DecodeError {
                offset: start,
                message: format!("invalid number `{}`", text),
            })
        } else {
            text.parse::<i64>().map(Literal::Int).map_err(|_| DecodeError {
                offset: start,
                message: format!("invalid number `{}`", text),
            })
        }
    }

    fn keyword(&mut self) -> Result<Literal, DecodeError> {
        let rest = self.rest();
        let length = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        let value = match &rest[..length] {
            "None" => Literal::None,
            "True" => Literal::Bool(true),
            "False" => Literal::Bool(false),
            _ => return Err(self.error("unexpected token")),
        };
        self.position += length;
        Ok(value)
    }
}

fn simple_escape(c: char) -> Option<char> {
    match c {
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '0' => Some('\0'),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
