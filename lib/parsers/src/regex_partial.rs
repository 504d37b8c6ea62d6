// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Regex matching with partial-match detection.
//!
//! A streaming parser cannot commit to "no match" just because the pattern
//! did not match: the tail of the buffer may be the beginning of a match that
//! the next tokens will complete. [`PartialRegex::search`] therefore returns
//! a three-way result: a full match with capture ranges, a partial match
//! spanning the suffix that could still grow into one, or nothing.
//!
//! Partial detection runs a rewritten pattern against the *reversed* input:
//! for a pattern `P`, [`regex_to_reversed_partial`] builds a pattern that,
//! anchored at the start of `reverse(input)`, matches exactly when some
//! suffix of `input` is a prefix of a word accepted by `P`.

use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;

use crate::error::ParseError;

/// Byte offsets `[begin, end)` into the searched input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StringRange {
    pub begin: usize,
    pub end: usize,
}

impl StringRange {
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchKind {
    #[default]
    None,
    Partial,
    Full,
}

/// Result of a [`PartialRegex::search`].
///
/// For `Full`, `groups[0]` is the whole match and `groups[i]` the capture
/// groups, with unmatched optional groups reported as empty ranges. For
/// `Partial`, `groups[0]` spans from the start of the undecidable suffix to
/// the end of the input. For `None`, `groups` is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegexMatch {
    pub kind: MatchKind,
    pub groups: Vec<StringRange>,
}

impl RegexMatch {
    fn none() -> Self {
        Self::default()
    }
}

/// A compiled pattern plus its reversed partial-match companion.
///
/// Compiled patterns are immutable; dialect handlers share them through
/// `OnceLock` statics.
#[derive(Debug)]
pub struct PartialRegex {
    pattern: String,
    at_start: bool,
    forward: Regex,
    reversed_partial: Regex,
}

impl PartialRegex {
    pub fn new(pattern: &str) -> Result<Self, ParseError> {
        Self::with_at_start(pattern, false)
    }

    /// Compiles a pattern whose matches (full and partial) must begin exactly
    /// at the search position.
    pub fn with_at_start(pattern: &str, at_start: bool) -> Result<Self, ParseError> {
        let forward =
            Regex::new(pattern).map_err(|err| ParseError::invalid_pattern(pattern, err))?;
        let reversed = regex_to_reversed_partial(pattern)?;
        let reversed_partial = Regex::new(&format!("^{reversed}"))
            .map_err(|err| ParseError::invalid_pattern(&reversed, err))?;
        Ok(Self {
            pattern: pattern.to_string(),
            at_start,
            forward,
            reversed_partial,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Searches `input[from..]`, never failing at runtime.
    pub fn search(&self, input: &str, from: usize) -> RegexMatch {
        if from > input.len() {
            return RegexMatch::none();
        }
        if let Some(caps) = self.forward.captures_at(input, from) {
            let whole = caps.get(0).expect("group 0 always participates");
            if !self.at_start || whole.start() == from {
                let groups = (0..caps.len())
                    .map(|i| match caps.get(i) {
                        Some(group) => StringRange {
                            begin: group.start(),
                            end: group.end(),
                        },
                        None => StringRange::default(),
                    })
                    .collect();
                return RegexMatch {
                    kind: MatchKind::Full,
                    groups,
                };
            }
        }

        // No full match: look for a suffix that is a prefix of the language.
        // Reversing char-by-char keeps byte lengths intact, so the matched
        // length maps directly back onto input offsets.
        let reversed: String = input[from..].chars().rev().collect();
        if let Some(caps) = self.reversed_partial.captures(&reversed) {
            let len = caps.get(1).map(|group| group.len()).unwrap_or(0);
            if len > 0 {
                let begin = input.len() - len;
                if !self.at_start || begin == from {
                    return RegexMatch {
                        kind: MatchKind::Partial,
                        groups: vec![StringRange {
                            begin,
                            end: input.len(),
                        }],
                    };
                }
            }
        }
        RegexMatch::none()
    }
}

/// Rewrites `pattern` into the reversed partial-match pattern described in
/// the module docs. The result captures, as group 1, the reversed image of
/// the longest input suffix that prefixes the pattern's language, and ends in
/// `.*` so the remainder of the reversed input is ignored.
pub fn regex_to_reversed_partial(pattern: &str) -> Result<String, ParseError> {
    let mut chars = pattern.chars().peekable();
    let body = process_sequence(&mut chars, pattern)?;
    if chars.peek().is_some() {
        return Err(ParseError::invalid_pattern(pattern, "unmatched `)`"));
    }
    Ok(format!("({body}).*"))
}

/// Consumes one alternation-level subexpression, stopping at `)` or the end.
fn process_sequence(chars: &mut Peekable<Chars>, pattern: &str) -> Result<String, ParseError> {
    let mut alternatives: Vec<Vec<String>> = vec![Vec::new()];

    while let Some(&c) = chars.peek() {
        match c {
            '[' => {
                let atom = consume_char_class(chars, pattern)?;
                alternatives.last_mut().unwrap().push(atom);
            }
            '*' | '+' | '?' => {
                chars.next();
                let sequence = alternatives.last_mut().unwrap();
                let Some(atom) = sequence.last_mut() else {
                    return Err(ParseError::invalid_pattern(
                        pattern,
                        "quantifier without preceding element",
                    ));
                };
                atom.push(c);
                if c == '*' && chars.peek() == Some(&'?') {
                    chars.next();
                    atom.push('?');
                }
            }
            '{' => {
                chars.next();
                expand_bounded_repeat(chars, pattern, alternatives.last_mut().unwrap())?;
            }
            '(' => {
                chars.next();
                if chars.peek() == Some(&'?') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek() == Some(&':') {
                        chars.next();
                        chars.next();
                    }
                }
                let sub = process_sequence(chars, pattern)?;
                if chars.next() != Some(')') {
                    return Err(ParseError::invalid_pattern(pattern, "unmatched `(`"));
                }
                alternatives.last_mut().unwrap().push(format!("(?:{sub})"));
            }
            ')' => break,
            '|' => {
                chars.next();
                alternatives.push(Vec::new());
            }
            '\\' => {
                chars.next();
                let Some(escaped) = chars.next() else {
                    return Err(ParseError::invalid_pattern(pattern, "trailing `\\`"));
                };
                alternatives.last_mut().unwrap().push(format!("\\{escaped}"));
            }
            _ => {
                chars.next();
                alternatives.last_mut().unwrap().push(c.to_string());
            }
        }
    }

    // Emit each alternative reversed: the original tail comes first, and each
    // step back toward the head is optional, e.g. /abcd/ -> (?:(?:(?:d)?c)?b)?a.
    let mut reversed_alternatives = Vec::with_capacity(alternatives.len());
    for parts in &alternatives {
        let mut out = String::new();
        if parts.is_empty() {
            reversed_alternatives.push(out);
            continue;
        }
        for _ in 0..parts.len() - 1 {
            out.push_str("(?:");
        }
        for (i, part) in parts.iter().rev().enumerate() {
            let is_head = i + 1 == parts.len();
            if is_head {
                // The head atom runs up against the trailing `.*`; a starred
                // head flips greediness so the partial span stays minimal for
                // greedy stars and non-empty for lazy ones.
                out.push_str(&toggle_star_greediness(part));
            } else {
                out.push_str(part);
                out.push_str(")?");
            }
        }
        reversed_alternatives.push(out);
    }
    Ok(reversed_alternatives.join("|"))
}

fn toggle_star_greediness(atom: &str) -> String {
    if let Some(stripped) = atom.strip_suffix("*?") {
        format!("{stripped}*")
    } else if atom.ends_with('*') {
        format!("{atom}?")
    } else {
        atom.to_string()
    }
}

fn consume_char_class(chars: &mut Peekable<Chars>, pattern: &str) -> Result<String, ParseError> {
    let mut atom = String::new();
    atom.push(chars.next().unwrap());
    if chars.peek() == Some(&'^') {
        atom.push(chars.next().unwrap());
    }
    // A `]` right after the opening (or after `^`) is a literal member.
    if chars.peek() == Some(&']') {
        atom.push(chars.next().unwrap());
    }
    loop {
        match chars.next() {
            None => return Err(ParseError::invalid_pattern(pattern, "unmatched `[`")),
            Some(']') => {
                atom.push(']');
                return Ok(atom);
            }
            Some('\\') => {
                atom.push('\\');
                let Some(escaped) = chars.next() else {
                    return Err(ParseError::invalid_pattern(pattern, "trailing `\\`"));
                };
                atom.push(escaped);
            }
            Some(c) => atom.push(c),
        }
    }
}

/// Expands `{m,n}` on the preceding atom into `m` required copies followed by
/// `n - m` optional ones (or a starred copy when unbounded).
fn expand_bounded_repeat(
    chars: &mut Peekable<Chars>,
    pattern: &str,
    sequence: &mut Vec<String>,
) -> Result<(), ParseError> {
    let Some(atom) = sequence.pop() else {
        return Err(ParseError::invalid_pattern(
            pattern,
            "repetition without preceding element",
        ));
    };
    let mut range = String::new();
    loop {
        match chars.next() {
            None => return Err(ParseError::invalid_pattern(pattern, "unmatched `{`")),
            Some('}') => break,
            Some(c) => range.push(c),
        }
    }
    let parts: Vec<&str> = range.split(',').collect();
    if parts.len() > 2 {
        return Err(ParseError::invalid_pattern(pattern, "invalid repetition range"));
    }
    let parse_bound = |s: &str| -> Result<Option<usize>, ParseError> {
        if s.is_empty() {
            return Ok(None);
        }
        s.parse::<usize>()
            .map(Some)
            .map_err(|_| ParseError::invalid_pattern(pattern, "invalid repetition bound"))
    };
    let min = parse_bound(parts[0])?.unwrap_or(0);
    let max = if parts.len() == 1 {
        Some(min)
    } else {
        parse_bound(parts[1])?
    };
    if let Some(max) = max {
        if max < min {
            return Err(ParseError::invalid_pattern(pattern, "invalid repetition range"));
        }
    }

    for _ in 0..min {
        sequence.push(atom.clone());
    }
    match max {
        Some(max) => {
            for _ in min..max {
                sequence.push(format!("{atom}?"));
            }
        }
        None => sequence.push(format!("{atom}*")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a+", "(a+).*")]
    #[case("a*", "(a*?).*")]
    #[case("a?", "(a?).*")]
    #[case("[a-z]", "([a-z]).*")]
    #[case("[a-z]\\w+", "((?:\\w+)?[a-z]).*")]
    #[case("(?:a|b)", "((?:a|b)).*")]
    #[case("abcd", "((?:(?:(?:d)?c)?b)?a).*")]
    #[case("a*b", "((?:b)?a*?).*")]
    #[case(".*?ab", "((?:(?:b)?a)?.*).*")]
    #[case("a.*?b", "((?:(?:b)?.*?)?a).*")]
    #[case("a(bc)d", "((?:(?:d)?(?:(?:c)?b))?a).*")]
    #[case("a(bc|de)", "((?:(?:(?:c)?b|(?:e)?d))?a).*")]
    #[case("ab{2,4}c", "((?:(?:(?:(?:(?:c)?b?)?b?)?b)?b)?a).*")]
    fn canonical_reversed_patterns(#[case] pattern: &str, #[case] expected: &str) {
        assert_eq!(regex_to_reversed_partial(pattern).unwrap(), expected);
    }

    #[rstest]
    #[case("a(b")]
    #[case("a)b)")]
    #[case("a[bc")]
    #[case("*a")]
    #[case("a{2,1}")]
    #[case("a{1,2,3}")]
    #[case("a\\")]
    fn malformed_patterns_fail_eagerly(#[case] pattern: &str) {
        assert!(matches!(
            PartialRegex::new(pattern),
            Err(ParseError::InvalidRegexPattern { .. })
        ));
    }

    fn full(begin: usize, end: usize) -> RegexMatch {
        RegexMatch {
            kind: MatchKind::Full,
            groups: vec![StringRange { begin, end }],
        }
    }

    fn partial(begin: usize, end: usize) -> RegexMatch {
        RegexMatch {
            kind: MatchKind::Partial,
            groups: vec![StringRange { begin, end }],
        }
    }

    fn none() -> RegexMatch {
        RegexMatch::none()
    }

    #[rstest]
    #[case("a", "a", full(0, 1))]
    #[case("a", "b", none())]
    #[case("a", "ab", full(0, 1))]
    #[case("a", "ba", full(1, 2))]
    #[case("abcd", "abcd", full(0, 4))]
    #[case("abcd", "abcde", full(0, 4))]
    #[case("abcd", "abc", partial(0, 3))]
    #[case("abcd", "ab", partial(0, 2))]
    #[case("abcd", "a", partial(0, 1))]
    #[case("abcd", "d", none())]
    #[case("abcd", "bcd", none())]
    #[case("abcd", "cde", none())]
    #[case("abcd", "yeah ab", partial(5, 7))]
    #[case("abcd", "abbie", none())]
    #[case("abcd", "", none())]
    #[case(".*?ab", "ab", full(0, 2))]
    #[case(".*?ab", "dab", full(0, 3))]
    #[case(".*?ab", "da", partial(0, 2))]
    #[case(".*?ab", "d", partial(0, 1))]
    #[case("a.*?b", "ab", full(0, 2))]
    #[case("a.*?b", "abc", full(0, 2))]
    #[case("a.*?b", "a b", full(0, 3))]
    #[case("a.*?b", "a", partial(0, 1))]
    #[case("a.*?b", "argh", partial(0, 4))]
    #[case("a.*?b", "d", none())]
    #[case("a.*?b", "b", none())]
    #[case("ab(?:cd){2,4}ef", "ab", partial(0, 2))]
    #[case("ab(?:cd){2,4}ef", "abcd", partial(0, 4))]
    #[case("ab(?:cd){2,4}ef", "abcde", none())]
    #[case("ab(?:cd){2,4}ef", "abcdef", none())]
    #[case("ab(?:cd){2,4}ef", "abcdcd", partial(0, 6))]
    #[case("ab(?:cd){2,4}ef", "abcdcde", partial(0, 7))]
    #[case("ab(?:cd){2,4}ef", "abcdcdef", full(0, 8))]
    #[case("ab(?:cd){2,4}ef", "abcdcdcdcdef", full(0, 12))]
    #[case("ab(?:cd){2,4}ef", "abcdcdcdcdcdef", none())]
    #[case("ab(?:cd){2,4}ef", "yea", partial(2, 3))]
    #[case("a(?:rte| pure )fact", "a", partial(0, 1))]
    #[case("a(?:rte| pure )fact", "art", partial(0, 3))]
    #[case("a(?:rte| pure )fact", "artefa", partial(0, 6))]
    #[case("a(?:rte| pure )fact", "fact", none())]
    #[case("a(?:rte| pure )fact", "an arte", partial(3, 7))]
    #[case("a(?:rte| pure )fact", "artefact", full(0, 8))]
    #[case("a(?:rte| pure )fact", "an artefact", full(3, 11))]
    #[case("a(?:rte| pure )fact", "a pure", partial(0, 6))]
    #[case("a(?:rte| pure )fact", "a pure fact", full(0, 11))]
    #[case("a(?:rte| pure )fact", "it's a pure fact", full(5, 16))]
    #[case("a(?:rte| pure )fact", "", none())]
    #[case("a(?:rte| pure )fact", "pure", none())]
    #[case("a(?:rte| pure )fact", "pure fact", none())]
    fn search_from_start(#[case] pattern: &str, #[case] input: &str, #[case] expected: RegexMatch) {
        let regex = PartialRegex::new(pattern).unwrap();
        let result = regex.search(input, 0);
        assert_eq!(result.kind, expected.kind, "pattern {pattern:?} on {input:?}");
        if expected.kind != MatchKind::None {
            assert_eq!(result.groups[0], expected.groups[0]);
        }
    }

    #[rstest]
    #[case(" abcc", none())]
    #[case("ab", partial(0, 2))]
    #[case("abc", full(0, 3))]
    #[case(" ab", none())]
    fn anchored_search_requires_match_at_position(#[case] input: &str, #[case] expected: RegexMatch) {
        let regex = PartialRegex::with_at_start("abc", true).unwrap();
        let result = regex.search(input, 0);
        assert_eq!(result.kind, expected.kind);
        if expected.kind != MatchKind::None {
            assert_eq!(result.groups[0], expected.groups[0]);
        }
    }

    #[test]
    fn full_match_reports_capture_groups() {
        let regex = PartialRegex::new("<function=([^>]+)>").unwrap();
        let result = regex.search("text <function=lookup>", 0);
        assert_eq!(result.kind, MatchKind::Full);
        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0], StringRange { begin: 5, end: 22 });
        assert_eq!(result.groups[1], StringRange { begin: 15, end: 21 });
    }

    #[test]
    fn unmatched_optional_groups_are_empty_ranges() {
        let regex = PartialRegex::new("a(b)?c").unwrap();
        let result = regex.search("ac", 0);
        assert_eq!(result.kind, MatchKind::Full);
        assert!(result.groups[1].is_empty());
    }

    #[test]
    fn multibyte_tokens_match_partially() {
        let regex = PartialRegex::new("<｜tool▁calls▁begin｜>").unwrap();
        let input = "some text <｜tool▁ca";
        let result = regex.search(input, 0);
        assert_eq!(result.kind, MatchKind::Partial);
        assert_eq!(result.groups[0].begin, 10);
        assert_eq!(result.groups[0].end, input.len());
    }

    #[test]
    fn search_past_end_matches_nothing() {
        let regex = PartialRegex::new("a").unwrap();
        assert_eq!(regex.search("aa", 5).kind, MatchKind::None);
    }
}
