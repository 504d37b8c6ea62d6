// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! JSON parsing that accepts truncated prefixes.
//!
//! A model streaming tool-call arguments stops mid-document on every chunk
//! boundary. [`parse`] consumes a JSON value from the front of the input; if
//! the input ends inside the value, the parser completes it with the smallest
//! synthetic suffix, planting the caller-supplied healing marker at the point
//! of truncation. The marker bookkeeping ([`HealingMarker`]) lets callers
//! recover the genuine prefix of the compact serialization by cutting at
//! `dump_marker`, which is how streamed `arguments` strings stay free of
//! synthetic content.

use serde_json::{Map, Value};

use crate::error::ParseError;

/// Where the synthetic completion begins.
///
/// `marker` is the literal sentinel injected into the healed value. It never
/// occurs in the original input. `dump_marker` is the substring of the
/// compact serialization that bounds real content; it differs from `marker`
/// when the healed syntax required quoting (a synthetic `"`, `:"` or `,"`
/// belongs to the synthetic side of the cut).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HealingMarker {
    pub marker: String,
    pub dump_marker: String,
}

impl HealingMarker {
    pub fn is_empty(&self) -> bool {
        self.marker.is_empty()
    }
}

/// A parsed (and possibly healed) JSON value. `healing_marker` is empty when
/// the input parsed cleanly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedJson {
    pub value: Value,
    pub healing_marker: HealingMarker,
}

/// Consumes one JSON value from the front of `input`.
///
/// Returns the value and the number of bytes consumed (through the end of the
/// value for clean parses, the whole input when healing was needed). Fails
/// with [`ParseError::InvalidJson`] when the input is neither a valid value
/// nor a truncated prefix of one.
pub fn parse(input: &str, healing_marker: &str) -> Result<(ParsedJson, usize), ParseError> {
    let mut scanner = Scanner {
        input,
        bytes: input.as_bytes(),
        pos: 0,
        marker: healing_marker,
    };
    scanner.skip_whitespace();
    if scanner.at_end() {
        return Err(scanner.error("expected a JSON value"));
    }
    match scanner.value()? {
        Parsed::Complete(value) => {
            let consumed = scanner.pos;
            Ok((
                ParsedJson {
                    value,
                    healing_marker: HealingMarker::default(),
                },
                consumed,
            ))
        }
        // A number or literal that runs into the end of input: at top level
        // there is nothing to heal against, accept it if it stands on its own.
        Parsed::AtEof(Some(value)) => Ok((
            ParsedJson {
                value,
                healing_marker: HealingMarker::default(),
            },
            input.len(),
        )),
        Parsed::AtEof(None) => Err(scanner.error("truncated bare literal")),
        Parsed::Healed { value, dump_marker } => {
            tracing::debug!(healed = %value, %dump_marker, "healed truncated JSON prefix");
            Ok((
                ParsedJson {
                    value,
                    healing_marker: HealingMarker {
                        marker: healing_marker.to_string(),
                        dump_marker,
                    },
                },
                input.len(),
            ))
        }
    }
}

enum Parsed {
    /// A value followed by more input (or a closed container).
    Complete(Value),
    /// A number/keyword token cut off by the end of input. More digits or
    /// letters could still arrive, so containers drop it; `Some` when the
    /// token is already valid on its own.
    AtEof(Option<Value>),
    /// The input ended inside this value; it was completed synthetically.
    Healed { value: Value, dump_marker: String },
}

enum StringToken {
    Complete(String),
    /// Input ended before the closing quote; `partial` holds the decoded
    /// content seen so far.
    Truncated { partial: String },
}

struct Scanner<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    marker: &'a str,
}

impl<'a> Scanner<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::InvalidJson {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// The marker as a JSON string value, e.g. the healed value of a key that
    /// was cut off before its `:`.
    fn marker_value(&self) -> Value {
        Value::String(self.marker.to_string())
    }

    fn value(&mut self) -> Result<Parsed, ParseError> {
        match self.peek() {
            Some(b'{') => self.object(),
            Some(b'[') => self.array(),
            Some(b'"') => Ok(match self.string()? {
                StringToken::Complete(s) => Parsed::Complete(Value::String(s)),
                StringToken::Truncated { partial } => Parsed::Healed {
                    value: Value::String(format!("{partial}{}", self.marker)),
                    dump_marker: self.marker.to_string(),
                },
            }),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(b't' | b'f' | b'n') => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn object(&mut self) -> Result<Parsed, ParseError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.at_end() {
                // After `{` or a `,`: invent a key so the object closes.
                map.insert(self.marker.to_string(), Value::from(1));
                return Ok(Parsed::Healed {
                    value: Value::Object(map),
                    dump_marker: format!("\"{}", self.marker),
                });
            }
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Parsed::Complete(Value::Object(map)));
            }
            if self.peek() != Some(b'"') {
                return Err(self.error("expected object key"));
            }
            let key = match self.string()? {
                StringToken::Complete(key) => key,
                StringToken::Truncated { partial } => {
                    map.insert(format!("{partial}{}", self.marker), Value::from(1));
                    return Ok(Parsed::Healed {
                        value: Value::Object(map),
                        dump_marker: self.marker.to_string(),
                    });
                }
            };
            self.skip_whitespace();
            if self.at_end() {
                // Key closed but `:` never arrived.
                map.insert(key, self.marker_value());
                return Ok(Parsed::Healed {
                    value: Value::Object(map),
                    dump_marker: format!(":\"{}", self.marker),
                });
            }
            if self.peek() != Some(b':') {
                return Err(self.error("expected `:` after object key"));
            }
            self.pos += 1;
            self.skip_whitespace();
            if self.at_end() {
                map.insert(key, self.marker_value());
                return Ok(Parsed::Healed {
                    value: Value::Object(map),
                    dump_marker: format!("\"{}", self.marker),
                });
            }
            match self.value()? {
                Parsed::Complete(value) => {
                    map.insert(key, value);
                }
                Parsed::AtEof(_) => {
                    // The value may have been cut mid-token; don't trust it.
                    map.insert(key, self.marker_value());
                    return Ok(Parsed::Healed {
                        value: Value::Object(map),
                        dump_marker: format!("\"{}", self.marker),
                    });
                }
                Parsed::Healed { value, dump_marker } => {
                    map.insert(key, value);
                    return Ok(Parsed::Healed {
                        value: Value::Object(map),
                        dump_marker,
                    });
                }
            }
            self.skip_whitespace();
            if self.at_end() {
                map.insert(self.marker.to_string(), Value::from(1));
                return Ok(Parsed::Healed {
                    value: Value::Object(map),
                    dump_marker: format!(",\"{}", self.marker),
                });
            }
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(Value::Object(map)));
                }
                _ => return Err(self.error("expected `,` or `}` in object")),
            }
        }
    }

    fn array(&mut self) -> Result<Parsed, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.at_end() {
                items.push(self.marker_value());
                return Ok(Parsed::Healed {
                    value: Value::Array(items),
                    dump_marker: format!("\"{}", self.marker),
                });
            }
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(Parsed::Complete(Value::Array(items)));
            }
            match self.value()? {
                Parsed::Complete(value) => items.push(value),
                Parsed::AtEof(_) => {
                    items.push(self.marker_value());
                    return Ok(Parsed::Healed {
                        value: Value::Array(items),
                        dump_marker: format!("\"{}", self.marker),
                    });
                }
                Parsed::Healed { value, dump_marker } => {
                    items.push(value);
                    return Ok(Parsed::Healed {
                        value: Value::Array(items),
                        dump_marker,
                    });
                }
            }
            self.skip_whitespace();
            if self.at_end() {
                items.push(self.marker_value());
                return Ok(Parsed::Healed {
                    value: Value::Array(items),
                    dump_marker: format!(",\"{}", self.marker),
                });
            }
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(Value::Array(items)));
                }
                _ => return Err(self.error("expected `,` or `]` in array")),
            }
        }
    }

    fn string(&mut self) -> Result<StringToken, ParseError> {
        self.pos += 1;
        let mut content = String::new();
        let mut segment_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    content.push_str(&self.input[segment_start..self.pos]);
                    return Ok(StringToken::Truncated { partial: content });
                }
                Some(b'"') => {
                    content.push_str(&self.input[segment_start..self.pos]);
                    self.pos += 1;
                    return Ok(StringToken::Complete(content));
                }
                Some(b'\\') => {
                    content.push_str(&self.input[segment_start..self.pos]);
                    self.pos += 1;
                    match self.escape()? {
                        // A truncated escape sequence is dropped entirely.
                        None => return Ok(StringToken::Truncated { partial: content }),
                        Some(c) => content.push(c),
                    }
                    segment_start = self.pos;
                }
                Some(c) if c < 0x20 => {
                    return Err(self.error("unescaped control character in string"));
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Decodes one escape sequence after the backslash. `None` means the
    /// input ended mid-sequence.
    fn escape(&mut self) -> Result<Option<char>, ParseError> {
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        self.pos += 1;
        let decoded = match c {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{0008}',
            b'f' => '\u{000C}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => {
                let Some(high) = self.hex_code_unit()? else {
                    return Ok(None);
                };
                if (0xD800..0xDC00).contains(&high) {
                    // High surrogate: needs a `\uXXXX` partner.
                    if self.at_end() {
                        return Ok(None);
                    }
                    if self.peek() != Some(b'\\') {
                        return Err(self.error("unpaired surrogate in string"));
                    }
                    self.pos += 1;
                    if self.at_end() {
                        return Ok(None);
                    }
                    if self.peek() != Some(b'u') {
                        return Err(self.error("unpaired surrogate in string"));
                    }
                    self.pos += 1;
                    let Some(low) = self.hex_code_unit()? else {
                        return Ok(None);
                    };
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(self.error("unpaired surrogate in string"));
                    }
                    let combined =
                        0x10000 + (((high - 0xD800) as u32) << 10) + (low - 0xDC00) as u32;
                    char::from_u32(combined)
                        .ok_or_else(|| self.error("invalid surrogate pair"))?
                } else if (0xDC00..0xE000).contains(&high) {
                    return Err(self.error("unpaired surrogate in string"));
                } else {
                    char::from_u32(high as u32)
                        .ok_or_else(|| self.error("invalid unicode escape"))?
                }
            }
            _ => return Err(self.error("invalid escape sequence")),
        };
        Ok(Some(decoded))
    }

    /// Reads 4 hex digits; `None` when the input ends first.
    fn hex_code_unit(&mut self) -> Result<Option<u16>, ParseError> {
        if self.pos + 4 > self.bytes.len() {
            self.pos = self.bytes.len();
            return Ok(None);
        }
        let digits = std::str::from_utf8(&self.bytes[self.pos..self.pos + 4])
            .map_err(|_| self.error("invalid unicode escape"))?;
        let unit = u16::from_str_radix(digits, 16)
            .map_err(|_| self.error("invalid unicode escape"))?;
        self.pos += 4;
        Ok(Some(unit))
    }

    fn number(&mut self) -> Result<Parsed, ParseError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
        ) {
            self.pos += 1;
        }
        let token = &self.input[start..self.pos];
        let value = serde_json::from_str::<Value>(token).ok();
        if self.at_end() {
            return Ok(Parsed::AtEof(value));
        }
        match value {
            Some(value) => Ok(Parsed::Complete(value)),
            None => Err(self.error("malformed number")),
        }
    }

    fn keyword(&mut self) -> Result<Parsed, ParseError> {
        let (word, value) = match self.peek() {
            Some(b't') => ("true", Value::Bool(true)),
            Some(b'f') => ("false", Value::Bool(false)),
            _ => ("null", Value::Null),
        };
        for expected in word.bytes() {
            match self.peek() {
                None => return Ok(Parsed::AtEof(None)),
                Some(c) if c == expected => self.pos += 1,
                Some(_) => return Err(self.error("unexpected keyword")),
            }
        }
        Ok(Parsed::Complete(value))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const MARKER: &str = "$foo";

    fn parse_ok(input: &str) -> ParsedJson {
        parse(input, MARKER).unwrap().0
    }

    fn dump(value: &Value) -> String {
        serde_json::to_string(value).unwrap()
    }

    #[rstest]
    #[case(r#"{"a":"b"}"#)]
    #[case(r#"{"hey":1,"ho\"ha":[1]}"#)]
    #[case(r#"[{"a":"b"}]"#)]
    #[case(r#"[1,2.5,-3,true,false,null,"x"]"#)]
    #[case(r#""just a string""#)]
    #[case("42")]
    fn clean_input_round_trips(#[case] input: &str) {
        let parsed = parse_ok(input);
        assert!(parsed.healing_marker.is_empty());
        assert_eq!(dump(&parsed.value), input);
    }

    #[test]
    fn object_keys_keep_insertion_order() {
        let parsed = parse_ok(r#"{"z":1,"a":2,"m":3}"#);
        assert_eq!(dump(&parsed.value), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn consumed_length_stops_after_the_value() {
        let input = r#"{"a": 1} trailing"#;
        let (parsed, consumed) = parse(input, MARKER).unwrap();
        assert_eq!(&input[consumed..], " trailing");
        assert_eq!(dump(&parsed.value), r#"{"a":1}"#);
    }

    #[test]
    fn truncated_array_is_closed_with_a_marker_element() {
        let parsed = parse_ok(r#"[{"a": "b"}"#);
        assert_eq!(dump(&parsed.value), r#"[{"a":"b"},"$foo"]"#);
        assert_eq!(parsed.healing_marker.dump_marker, ",\"$foo");
    }

    #[test]
    fn truncated_key_is_healed_in_place() {
        let parsed = parse_ok(r#"{ "code"#);
        assert_eq!(dump(&parsed.value), r#"{"code$foo":1}"#);
        assert_eq!(parsed.healing_marker.dump_marker, "$foo");
    }

    #[test]
    fn complete_key_without_colon_gets_a_marker_value() {
        let parsed = parse_ok(r#"{ "code""#);
        assert_eq!(dump(&parsed.value), r#"{"code":"$foo"}"#);
        assert_eq!(parsed.healing_marker.dump_marker, ":\"$foo");
    }

    // The cut position must keep exactly the characters that were truly seen.
    #[rstest]
    #[case(r#"{"#, r#"{"#)]
    #[case(r#"{""#, r#"{""#)]
    #[case(r#"{"n"#, r#"{"n"#)]
    #[case(r#"{"name""#, r#"{"name""#)]
    #[case(r#"{"name":"#, r#"{"name":"#)]
    #[case(r#"{"name":""#, r#"{"name":""#)]
    #[case(r#"{"name":"python"#, r#"{"name":"python"#)]
    #[case(r#"{"arg1": 1"#, r#"{"arg1":"#)]
    #[case(r#"{"arg1": 1 "#, r#"{"arg1":1"#)]
    #[case(r#"{"arg1": tru"#, r#"{"arg1":"#)]
    #[case(r#"["#, r#"["#)]
    #[case(r#"[1"#, r#"["#)]
    #[case(r#"[1 "#, r#"[1"#)]
    #[case(r#"[1,"#, r#"[1,"#)]
    #[case(r#"["1""#, r#"["1""#)]
    fn healed_dump_cut_at_marker_recovers_the_real_prefix(
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        let parsed = parse_ok(input);
        assert!(!parsed.healing_marker.is_empty());
        let dumped = dump(&parsed.value);
        let cut = dumped
            .find(&parsed.healing_marker.dump_marker)
            .expect("dump marker must occur in the dump");
        assert_eq!(&dumped[..cut], expected);
    }

    #[rstest]
    #[case(r#"{"a": "b"}"#)]
    #[case(r#"{"hey": 1, "ho\"ha": [1]}"#)]
    #[case(r#"[{"a": "b"}]"#)]
    fn every_proper_prefix_heals_to_a_prefix_of_the_full_dump(#[case] doc: &str) {
        let full_dump = dump(&parse_ok(doc).value);
        for cut in 1..doc.len() {
            let prefix = &doc[..cut];
            let parsed = parse(prefix, MARKER)
                .unwrap_or_else(|err| panic!("prefix {prefix:?} failed: {err}"))
                .0;
            let dumped = dump(&parsed.value);
            let real = match dumped.find(&parsed.healing_marker.dump_marker) {
                Some(i) if !parsed.healing_marker.is_empty() => &dumped[..i],
                _ => &dumped,
            };
            assert!(
                full_dump.starts_with(real),
                "prefix {prefix:?}: {real:?} is not a prefix of {full_dump:?}"
            );
        }
    }

    #[rstest]
    #[case("]")]
    #[case("}")]
    #[case("nope")]
    #[case("{\"a\" 1}")]
    #[case("{'a': 1}")]
    #[case("[1 2]")]
    #[case("01")]
    #[case("")]
    #[case("   ")]
    fn unhealable_input_is_invalid(#[case] input: &str) {
        assert!(matches!(
            parse(input, MARKER),
            Err(ParseError::InvalidJson { .. })
        ));
    }

    #[test]
    fn escapes_decode_and_truncated_escapes_are_dropped() {
        let parsed = parse_ok("\"a\\nb\\");
        // The dangling backslash is gone; everything before it survives.
        assert_eq!(parsed.value, Value::String("a\nb$foo".to_string()));

        let parsed = parse_ok(r#""tab\there""#);
        assert!(parsed.healing_marker.is_empty());
        assert_eq!(parsed.value, Value::String("tab\there".to_string()));
    }

    #[test]
    fn surrogate_pairs_decode() {
        let parsed = parse_ok(r#""😀""#);
        assert!(parsed.healing_marker.is_empty());
        assert_eq!(parsed.value, Value::String("😀".to_string()));
    }

    #[test]
    fn top_level_number_at_eof_is_accepted_as_is() {
        let (parsed, consumed) = parse("125", MARKER).unwrap();
        assert!(parsed.healing_marker.is_empty());
        assert_eq!(parsed.value, Value::from(125));
        assert_eq!(consumed, 3);
    }
}
