// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The cursor-based driver that dialect handlers script against.
//!
//! A [`ChatParser`] owns a mutable position into the raw model output and a
//! [`ChatMessage`] under construction. Primitives either leave the cursor
//! untouched (no match) or advance it past what they consumed; in partial
//! mode, primitives that *cannot decide yet* finalize the message and return
//! [`ParseError::Incomplete`], which the public API turns into a well-formed
//! truncated message.

use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::json_partial::{self, HealingMarker, ParsedJson};
use crate::message::{ChatMessage, ToolCall};
use crate::regex_partial::{MatchKind, PartialRegex, StringRange};
use crate::syntax::{ChatSyntax, ReasoningFormat};

/// A regex (or literal) located ahead of the cursor: the skipped-over text
/// and the match's capture ranges.
#[derive(Debug)]
pub struct FindResult<'a> {
    pub prelude: &'a str,
    pub groups: Vec<StringRange>,
}

/// A regex consumed exactly at the cursor.
#[derive(Debug)]
pub struct ConsumeResult {
    pub groups: Vec<StringRange>,
}

/// A JSON value whose argument subtrees have been re-serialized as strings,
/// trimmed of synthetic content. `is_partial` reports whether a healing
/// marker was found (and removed) anywhere during the walk.
#[derive(Debug)]
pub struct DumpedJson {
    pub value: Value,
    pub is_partial: bool,
}

pub struct ChatParser<'a> {
    input: &'a str,
    is_partial: bool,
    syntax: ChatSyntax,
    pos: usize,
    result: ChatMessage,
    healing_marker: String,
}

impl<'a> ChatParser<'a> {
    pub fn new(input: &'a str, is_partial: bool, syntax: ChatSyntax) -> Self {
        Self {
            input,
            is_partial,
            syntax,
            pos: 0,
            result: ChatMessage::assistant(),
            healing_marker: generate_healing_marker(input),
        }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_partial(&self) -> bool {
        self.is_partial
    }

    pub fn syntax(&self) -> &ChatSyntax {
        &self.syntax
    }

    pub fn healing_marker(&self) -> &str {
        &self.healing_marker
    }

    pub fn result(&self) -> &ChatMessage {
        &self.result
    }

    pub fn into_message(self) -> ChatMessage {
        self.result
    }

    pub fn move_to(&mut self, pos: usize) -> Result<(), ParseError> {
        if pos > self.input.len() {
            return Err(ParseError::BadPosition {
                pos,
                len: self.input.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn move_back(&mut self, n: usize) -> Result<(), ParseError> {
        if self.pos < n {
            return Err(ParseError::BadPosition {
                pos: self.pos,
                len: self.input.len(),
            });
        }
        self.pos -= n;
        Ok(())
    }

    /// The input substring at `range`.
    pub fn slice(&self, range: StringRange) -> &'a str {
        &self.input[range.begin..range.end]
    }

    pub fn add_content(&mut self, content: &str) {
        self.result.content.push_str(content);
    }

    pub fn add_reasoning_content(&mut self, reasoning_content: &str) {
        self.result.reasoning_content.push_str(reasoning_content);
    }

    /// Appends a tool call; drops it silently (returning `false`) when the
    /// name is still empty.
    pub fn add_tool_call(&mut self, name: &str, id: &str, arguments: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut arguments = arguments.to_string();
        if arguments == "\"" {
            // Residue of healing `:"<marker>` right after `"arguments"`.
            arguments.clear();
        }
        tracing::debug!(name, %arguments, "adding tool call");
        self.result.tool_calls.push(ToolCall {
            name: name.to_string(),
            arguments,
            id: id.to_string(),
        });
        true
    }

    /// Like [`add_tool_call`](Self::add_tool_call), but first truncates
    /// `arguments` at the healing marker so synthetic content never leaks.
    pub fn add_tool_call_with_marker(
        &mut self,
        name: &str,
        id: &str,
        arguments: &str,
        healing: &HealingMarker,
    ) -> bool {
        let mut arguments = arguments;
        if !arguments.is_empty() && !healing.marker.is_empty() {
            if let Some(idx) = arguments
                .find(&healing.dump_marker)
                .or_else(|| arguments.find(&healing.marker))
            {
                arguments = &arguments[..idx];
            }
        }
        self.add_tool_call(name, id, arguments)
    }

    /// Builds a tool call from a `{"name", "id", "arguments"}` object, where
    /// `arguments` may already be a dumped string or still a JSON subtree.
    pub fn add_tool_call_from_json(&mut self, tool_call: &Value) -> bool {
        let name = tool_call.get("name").and_then(Value::as_str).unwrap_or("");
        let id = tool_call.get("id").and_then(Value::as_str).unwrap_or("");
        let arguments = match tool_call.get("arguments") {
            None => String::new(),
            Some(Value::String(dumped)) => dumped.clone(),
            Some(value) => serde_json::to_string(value).expect("JSON value serialization"),
        };
        self.add_tool_call(name, id, &arguments)
    }

    /// Adds every element of a tool-call array; `false` as soon as one is too
    /// incomplete to add.
    pub fn add_tool_calls(&mut self, arr: &Value) -> bool {
        let Some(items) = arr.as_array() else {
            return false;
        };
        for item in items {
            if !self.add_tool_call_from_json(item) {
                return false;
            }
        }
        true
    }

    /// Final invariants: nothing left over in non-partial mode, reasoning
    /// stripped, and content stripped when tool calls are present.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        if !self.is_partial && self.pos != self.input.len() {
            return Err(ParseError::UnexpectedTrailingContent(
                self.input[self.pos..].to_string(),
            ));
        }
        self.result.reasoning_content = self.result.reasoning_content.trim().to_string();
        if !self.result.tool_calls.is_empty() {
            self.result.content = self.result.content.trim().to_string();
        }
        Ok(())
    }

    /// The undecidable-state error. In partial mode the message is finalized
    /// first, so the caller can still surface a well-formed truncated result.
    pub fn incomplete(&mut self, reason: impl Into<String>) -> ParseError {
        if self.is_partial {
            // Cannot fail: the trailing-content check is non-partial only.
            let _ = self.finish();
        }
        ParseError::Incomplete(reason.into())
    }

    pub fn consume_spaces(&mut self) -> bool {
        let mut consumed = false;
        while self
            .input
            .as_bytes()
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
            consumed = true;
        }
        consumed
    }

    /// Atomic: advances past `literal` iff it sits exactly at the cursor.
    pub fn try_consume_literal(&mut self, literal: &str) -> bool {
        if self.input[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            return true;
        }
        false
    }

    pub fn consume_literal(&mut self, literal: &str) -> Result<(), ParseError> {
        if self.try_consume_literal(literal) {
            return Ok(());
        }
        Err(self.incomplete(format!(
            "expected literal `{literal}` at position {}",
            self.pos
        )))
    }

    pub fn consume_rest(&mut self) -> &'a str {
        let rest = &self.input[self.pos..];
        self.pos = self.input.len();
        rest
    }

    /// Finds `literal` ahead of the cursor and consumes through it. In
    /// partial mode a trailing partial occurrence counts: the match range
    /// extends to the end of input so a half-streamed tag is swallowed
    /// rather than leaked into content.
    pub fn try_find_literal(&mut self, literal: &str) -> Option<FindResult<'a>> {
        if let Some(idx) = self.input[self.pos..].find(literal) {
            let begin = self.pos + idx;
            let end = begin + literal.len();
            let prelude = &self.input[self.pos..begin];
            self.pos = end;
            return Some(FindResult {
                prelude,
                groups: vec![StringRange { begin, end }],
            });
        }
        if self.is_partial {
            if let Some(begin) = find_partial_stop(self.input, literal) {
                if begin >= self.pos {
                    let prelude = &self.input[self.pos..begin];
                    let end = self.input.len();
                    self.pos = end;
                    return Some(FindResult {
                        prelude,
                        groups: vec![StringRange { begin, end }],
                    });
                }
            }
        }
        None
    }

    /// Searches for `regex` from `from` (default: the cursor). A full match
    /// consumes through its end and returns the skipped prelude. A partial
    /// match is no match in non-partial mode; in partial mode it flushes the
    /// prelude into content (so re-parses stay monotone) and is `Incomplete`.
    pub fn try_find_regex(
        &mut self,
        regex: &PartialRegex,
        from: Option<usize>,
    ) -> Result<Option<FindResult<'a>>, ParseError> {
        let m = regex.search(self.input, from.unwrap_or(self.pos));
        match m.kind {
            MatchKind::None => Ok(None),
            MatchKind::Partial => {
                if self.is_partial {
                    let prelude = &self.input[self.pos..m.groups[0].begin];
                    self.pos = m.groups[0].end;
                    self.add_content(prelude);
                    return Err(self.incomplete(regex.pattern().to_string()));
                }
                Ok(None)
            }
            MatchKind::Full => {
                let prelude = &self.input[self.pos..m.groups[0].begin];
                self.pos = m.groups[0].end;
                Ok(Some(FindResult {
                    prelude,
                    groups: m.groups,
                }))
            }
        }
    }

    /// Like [`try_find_regex`](Self::try_find_regex), but the match must
    /// start exactly at the cursor.
    pub fn try_consume_regex(
        &mut self,
        regex: &PartialRegex,
    ) -> Result<Option<ConsumeResult>, ParseError> {
        let m = regex.search(self.input, self.pos);
        match m.kind {
            MatchKind::None => Ok(None),
            MatchKind::Partial => {
                if self.is_partial {
                    return Err(self.incomplete(regex.pattern().to_string()));
                }
                Ok(None)
            }
            MatchKind::Full => {
                if m.groups[0].begin != self.pos {
                    return Ok(None);
                }
                self.pos = m.groups[0].end;
                Ok(Some(ConsumeResult { groups: m.groups }))
            }
        }
    }

    pub fn consume_regex(&mut self, regex: &PartialRegex) -> Result<ConsumeResult, ParseError> {
        match self.try_consume_regex(regex)? {
            Some(result) => Ok(result),
            None => Err(self.incomplete(regex.pattern().to_string())),
        }
    }

    /// Consumes a JSON value at the cursor, healing truncation in partial
    /// mode. Healed leaves outside `args_paths` are pruned back to bare
    /// marker placeholders so incidental healing cannot masquerade as model
    /// output; subtrees on `args_paths` keep their own partial content.
    pub fn try_consume_json(
        &mut self,
        args_paths: &[&[&str]],
    ) -> Result<Option<ParsedJson>, ParseError> {
        let Some(mut parsed) = self.try_consume_json_internal()? else {
            return Ok(None);
        };
        if parsed.healing_marker.is_empty() {
            return Ok(Some(parsed));
        }
        if !path_listed(args_paths, &[]) {
            let mut healing = parsed.healing_marker.clone();
            let mut path = Vec::new();
            let pruned = prune_healings(
                &parsed.value,
                &self.healing_marker,
                args_paths,
                &mut healing,
                &mut path,
            );
            tracing::debug!(from = %parsed.value, to = %pruned, "pruned partial JSON");
            parsed.value = pruned;
            parsed.healing_marker = healing;
        }
        Ok(Some(parsed))
    }

    pub fn consume_json(&mut self, args_paths: &[&[&str]]) -> Result<ParsedJson, ParseError> {
        match self.try_consume_json(args_paths)? {
            Some(parsed) => Ok(parsed),
            None => Err(self.incomplete("failed to consume JSON")),
        }
    }

    /// Consumes a JSON value and re-serializes every subtree on `args_paths`
    /// as a compact JSON string, trimmed at the healing marker. String values
    /// on `content_paths` are trimmed at the raw marker instead of dropped,
    /// so partial free text can stream through.
    pub fn try_consume_json_with_dumped_args(
        &mut self,
        args_paths: &[&[&str]],
        content_paths: &[&[&str]],
    ) -> Result<Option<DumpedJson>, ParseError> {
        let Some(parsed) = self.try_consume_json_internal()? else {
            return Ok(None);
        };
        if parsed.healing_marker.is_empty() && args_paths.is_empty() && content_paths.is_empty() {
            return Ok(Some(DumpedJson {
                value: parsed.value,
                is_partial: false,
            }));
        }

        let mut found_healing_marker = false;
        let mut path = Vec::new();
        let value = self.dump_args_walk(
            &parsed.value,
            &parsed.healing_marker,
            args_paths,
            content_paths,
            &mut found_healing_marker,
            &mut path,
        );
        Ok(Some(DumpedJson {
            value,
            is_partial: found_healing_marker,
        }))
    }

    pub fn consume_json_with_dumped_args(
        &mut self,
        args_paths: &[&[&str]],
        content_paths: &[&[&str]],
    ) -> Result<DumpedJson, ParseError> {
        match self.try_consume_json_with_dumped_args(args_paths, content_paths)? {
            Some(result) => Ok(result),
            None => Err(self.incomplete("failed to consume JSON")),
        }
    }

    fn try_consume_json_internal(&mut self) -> Result<Option<ParsedJson>, ParseError> {
        let Ok((parsed, consumed)) =
            json_partial::parse(&self.input[self.pos..], &self.healing_marker)
        else {
            return Ok(None);
        };
        self.pos += consumed;
        if parsed.healing_marker.is_empty() {
            return Ok(Some(parsed));
        }
        if !self.is_partial {
            return Err(self.incomplete("JSON is incomplete"));
        }
        tracing::debug!(
            json = %parsed.value,
            dump_marker = %parsed.healing_marker.dump_marker,
            "parsed partial JSON"
        );
        Ok(Some(parsed))
    }

    fn dump_args_walk(
        &self,
        json: &Value,
        healing: &HealingMarker,
        args_paths: &[&[&str]],
        content_paths: &[&[&str]],
        found: &mut bool,
        path: &mut Vec<String>,
    ) -> Value {
        if path_listed(args_paths, path) {
            let mut arguments =
                serde_json::to_string(json).expect("JSON value serialization");
            if self.is_partial && !healing.is_empty() {
                // The dump marker may carry syntax owned by the parent node
                // (`:"` after a key); inside the subtree dump only the raw
                // marker is guaranteed to appear.
                if let Some(idx) = arguments
                    .find(&healing.dump_marker)
                    .or_else(|| arguments.find(&healing.marker))
                {
                    arguments.truncate(idx);
                    *found = true;
                }
                if arguments == "\"" {
                    // Residue of healing `:"<marker>` right after the
                    // arguments key.
                    arguments.clear();
                }
            }
            return Value::String(arguments);
        }
        if path_listed(content_paths, path) {
            if let Value::String(text) = json {
                let mut text = text.clone();
                if !healing.is_empty() {
                    // Inside a decoded string the raw marker applies, not the
                    // quoting-aware dump marker.
                    if let Some(idx) = text.find(&healing.marker) {
                        text.truncate(idx);
                        *found = true;
                    }
                }
                return Value::String(text);
            }
            return json.clone();
        }
        match json {
            Value::Object(entries) => {
                let mut out = Map::new();
                for (key, value) in entries {
                    if !healing.is_empty() && key.contains(&healing.marker) {
                        // A synthetic or half-streamed key ends the object.
                        *found = true;
                        break;
                    }
                    path.push(key.clone());
                    let keep_partial =
                        path_listed(args_paths, path) || path_listed(content_paths, path);
                    if !keep_partial {
                        if let Value::String(text) = value {
                            if !healing.is_empty() && text.contains(&healing.marker) {
                                *found = true;
                                path.pop();
                                break;
                            }
                        }
                    }
                    let walked = self.dump_args_walk(
                        value,
                        healing,
                        args_paths,
                        content_paths,
                        found,
                        path,
                    );
                    out.insert(key.clone(), walked);
                    path.pop();
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let mut out = Vec::new();
                for value in items {
                    if let Value::String(text) = value {
                        if !healing.is_empty() && text.contains(&healing.marker) {
                            // Healed array values outside the arguments are
                            // not kept.
                            *found = true;
                            break;
                        }
                    }
                    out.push(self.dump_args_walk(
                        value,
                        healing,
                        args_paths,
                        content_paths,
                        found,
                        path,
                    ));
                }
                Value::Array(out)
            }
            _ => json.clone(),
        }
    }

    /// Extracts a reasoning block when the syntax calls for one. Returns
    /// whether reasoning was recognized.
    pub fn try_parse_reasoning(
        &mut self,
        start_think: &str,
        end_think: &str,
    ) -> Result<bool, ParseError> {
        if self.syntax.reasoning_format == ReasoningFormat::None {
            return Ok(false);
        }
        if !(self.syntax.thinking_forced_open || self.try_consume_literal(start_think)) {
            return Ok(false);
        }
        if let Some(res) = self.try_find_literal(end_think) {
            self.handle_reasoning(res.prelude, true);
            self.consume_spaces();
            return Ok(true);
        }
        let reasoning = self.consume_rest();
        let closed = !self.is_partial;
        self.handle_reasoning(reasoning, closed);
        if !self.syntax.thinking_forced_open {
            return Err(self.incomplete(format!(
                "failed to find end of reasoning tag `{end_think}`"
            )));
        }
        Ok(true)
    }

    fn handle_reasoning(&mut self, reasoning: &str, closed: bool) {
        let stripped = reasoning.trim();
        if stripped.is_empty() {
            return;
        }
        if self.syntax.reasoning_in_content {
            self.add_content("<think>");
            self.add_content(stripped);
            if closed {
                self.add_content("</think>");
            }
        } else {
            self.add_reasoning_content(stripped);
        }
    }
}

fn path_listed(paths: &[&[&str]], path: &[String]) -> bool {
    paths
        .iter()
        .any(|p| p.len() == path.len() && p.iter().zip(path).all(|(a, b)| *a == b.as_str()))
}

/// Walk-and-prune pass: healed leaves outside `args_paths` are replaced by
/// bare `{marker: 1}` placeholders, moving `dump_marker` back to the raw
/// marker when the cut lands after real content.
fn prune_healings(
    json: &Value,
    raw_marker: &str,
    args_paths: &[&[&str]],
    healing: &mut HealingMarker,
    path: &mut Vec<String>,
) -> Value {
    match json {
        Value::Object(entries) => {
            let mut out = Map::new();
            for (key, value) in entries {
                if let Some(idx) = key.find(raw_marker) {
                    // Keys are never healed halfway: cut just after the
                    // opening quote.
                    out.insert(raw_marker.to_string(), Value::from(1));
                    if idx != 0 {
                        healing.dump_marker = raw_marker.to_string();
                    }
                    break;
                }
                path.push(key.clone());
                if path_listed(args_paths, path) {
                    out.insert(key.clone(), value.clone());
                } else if let Value::String(text) = value {
                    if text.contains(raw_marker) {
                        out.insert(raw_marker.to_string(), Value::from(1));
                        healing.dump_marker = raw_marker.to_string();
                    } else {
                        out.insert(key.clone(), value.clone());
                    }
                } else {
                    let pruned = prune_healings(value, raw_marker, args_paths, healing, path);
                    out.insert(key.clone(), pruned);
                }
                path.pop();
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::new();
            for value in items {
                if let Value::String(text) = value {
                    if text.contains(raw_marker) {
                        out.push(Value::String(raw_marker.to_string()));
                        healing.dump_marker = raw_marker.to_string();
                        break;
                    }
                }
                out.push(prune_healings(value, raw_marker, args_paths, healing, path));
            }
            Value::Array(out)
        }
        _ => json.clone(),
    }
}

/// Longest-prefix partial occurrence of `stop` at the very end of `text`.
fn find_partial_stop(text: &str, stop: &str) -> Option<usize> {
    for len in (1..=stop.len().min(text.len())).rev() {
        if !stop.is_char_boundary(len) {
            continue;
        }
        if text.ends_with(&stop[..len]) {
            return Some(text.len() - len);
        }
    }
    None
}

/// Draws ~10-digit candidates from a PRNG seeded by the input until one does
/// not occur in it. The deterministic seed keeps healing reproducible across
/// re-parses of the same stream.
fn generate_healing_marker(input: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.len().hash(&mut hasher);
    input.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());
    loop {
        let candidate = format!("{:010}", rng.random_range(0..10_000_000_000u64));
        if !input.contains(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::syntax::ChatFormat;

    fn parser(input: &str, is_partial: bool) -> ChatParser<'_> {
        ChatParser::new(input, is_partial, ChatSyntax::default())
    }

    fn regex(pattern: &str) -> PartialRegex {
        PartialRegex::new(pattern).unwrap()
    }

    #[test]
    fn healing_marker_is_deterministic_and_absent_from_input() {
        let input = "some output 0123456789 with digits";
        let a = ChatParser::new(input, false, ChatSyntax::default());
        let b = ChatParser::new(input, false, ChatSyntax::default());
        assert_eq!(a.healing_marker(), b.healing_marker());
        assert!(!input.contains(a.healing_marker()));
    }

    #[test]
    fn cursor_moves_are_bounds_checked() {
        let mut p = parser("abc", false);
        assert!(p.move_to(3).is_ok());
        assert!(matches!(p.move_to(4), Err(ParseError::BadPosition { .. })));
        assert!(p.move_back(3).is_ok());
        assert!(matches!(p.move_back(1), Err(ParseError::BadPosition { .. })));
    }

    #[test]
    fn consume_regex_error_carries_the_pattern() {
        let mut p = parser("Hello, world!", false);
        let err = p.consume_regex(&regex("abc")).unwrap_err();
        assert!(matches!(&err, ParseError::Incomplete(reason) if reason == "abc"));
        let err = p.consume_regex(&regex("e")).unwrap_err();
        assert!(matches!(&err, ParseError::Incomplete(reason) if reason == "e"));
    }

    #[test]
    fn consume_regex_advances_past_the_match() {
        let mut p = parser("Hello, world!", false);
        p.consume_regex(&regex("Hello")).unwrap();
        assert_eq!(p.consume_rest(), ", world!");
    }

    #[test]
    fn non_partial_mode_can_decide_on_prefixes() {
        let mut p = parser("Hello,", false);
        assert!(p.try_consume_regex(&regex("Hello, world!")).unwrap().is_none());
        assert!(p.try_consume_regex(&regex("Hell(o, world!)?")).unwrap().is_some());
    }

    #[test]
    fn partial_mode_cannot_decide_on_prefixes() {
        let mut p = parser("Hello,", true);
        let err = p.try_consume_regex(&regex("Hello, world!")).unwrap_err();
        assert!(matches!(&err, ParseError::Incomplete(reason) if reason == "Hello, world!"));
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn definite_mismatches_are_no_matches_in_both_modes(#[case] is_partial: bool) {
        let mut p = parser("Hello,", is_partial);
        assert!(p.try_consume_regex(&regex("a(b|c)(d|e)f")).unwrap().is_none());
        assert!(!p.try_consume_literal("Oh"));
        assert_eq!(p.pos(), 0);
    }

    #[test]
    fn try_find_literal_reports_prelude_and_consumes() {
        let mut p = parser("say <end> rest", false);
        let res = p.try_find_literal("<end>").unwrap();
        assert_eq!(res.prelude, "say ");
        assert_eq!(p.consume_rest(), " rest");
    }

    #[test]
    fn try_find_literal_swallows_trailing_partial_occurrence() {
        let mut p = parser("reasoning</thi", true);
        let res = p.try_find_literal("</think>").unwrap();
        assert_eq!(res.prelude, "reasoning");
        assert_eq!(p.pos(), p.input().len());

        let mut p = parser("reasoning</thi", false);
        assert!(p.try_find_literal("</think>").is_none());
        assert_eq!(p.pos(), 0);
    }

    #[test]
    fn empty_tool_call_name_is_rejected() {
        let mut p = parser("", false);
        assert!(!p.add_tool_call("", "id", "{}"));
        assert!(p.result().tool_calls.is_empty());
        assert!(p.add_tool_call("f", "", "{}"));
        assert_eq!(p.result().tool_calls.len(), 1);
    }

    #[test]
    fn lone_quote_arguments_are_normalized_to_empty() {
        let mut p = parser("", false);
        assert!(p.add_tool_call("f", "", "\""));
        assert_eq!(p.result().tool_calls[0].arguments, "");
    }

    #[test]
    fn marker_truncation_applies_before_storing_arguments() {
        let mut p = parser("", false);
        let healing = HealingMarker {
            marker: "123".to_string(),
            dump_marker: "\"123".to_string(),
        };
        assert!(p.add_tool_call_with_marker("f", "", "{\"a\":\"123\"}", &healing));
        assert_eq!(p.result().tool_calls[0].arguments, "{\"a\":");
    }

    #[test]
    fn finish_rejects_trailing_content_when_not_partial() {
        let mut p = parser("abc", false);
        p.consume_literal("ab").unwrap();
        assert!(matches!(
            p.finish(),
            Err(ParseError::UnexpectedTrailingContent(rest)) if rest == "c"
        ));
    }

    #[test]
    fn finish_strips_reasoning_and_content_with_tool_calls() {
        let mut p = parser("", false);
        p.add_reasoning_content("  thinking \n");
        p.add_content("  text \n");
        p.add_tool_call("f", "", "{}");
        p.finish().unwrap();
        assert_eq!(p.result().reasoning_content, "thinking");
        assert_eq!(p.result().content, "text");
    }

    mod reasoning {
        use super::*;

        fn syntax(
            reasoning_format: ReasoningFormat,
            reasoning_in_content: bool,
            thinking_forced_open: bool,
        ) -> ChatSyntax {
            ChatSyntax {
                format: ChatFormat::ContentOnly,
                reasoning_format,
                reasoning_in_content,
                thinking_forced_open,
                parse_tool_calls: true,
            }
        }

        #[test]
        fn ignored_when_no_reasoning_format() {
            let mut p = ChatParser::new(
                "<tnk>Cogito</tnk>Ergo sum",
                false,
                syntax(ReasoningFormat::None, false, false),
            );
            assert!(!p.try_parse_reasoning("<tnk>", "</tnk>").unwrap());
            assert_eq!(p.consume_rest(), "<tnk>Cogito</tnk>Ergo sum");
        }

        #[test]
        fn extracts_tagged_reasoning() {
            let mut p = ChatParser::new(
                "<tnk>Cogito</tnk>Ergo sum",
                false,
                syntax(ReasoningFormat::DeepSeek, false, false),
            );
            assert!(p.try_parse_reasoning("<tnk>", "</tnk>").unwrap());
            assert_eq!(p.result().reasoning_content, "Cogito");
            assert_eq!(p.consume_rest(), "Ergo sum");
        }

        #[test]
        fn plain_content_is_left_alone_without_forced_open() {
            let mut p = ChatParser::new(
                "Cogito</tnk>Ergo sum",
                false,
                syntax(ReasoningFormat::DeepSeek, false, false),
            );
            assert!(!p.try_parse_reasoning("<tnk>", "</tnk>").unwrap());
            assert_eq!(p.consume_rest(), "Cogito</tnk>Ergo sum");
        }

        #[test]
        fn forced_open_reads_reasoning_without_start_tag() {
            let mut p = ChatParser::new(
                "Cogito</tnk>Ergo sum",
                false,
                syntax(ReasoningFormat::DeepSeek, false, true),
            );
            assert!(p.try_parse_reasoning("<tnk>", "</tnk>").unwrap());
            assert_eq!(p.result().reasoning_content, "Cogito");
            assert_eq!(p.consume_rest(), "Ergo sum");
        }

        #[test]
        fn reasoning_in_content_uses_canonical_think_tags() {
            let mut p = ChatParser::new(
                "Cogito</tnk>Ergo sum",
                false,
                syntax(ReasoningFormat::DeepSeek, true, true),
            );
            assert!(p.try_parse_reasoning("<tnk>", "</tnk>").unwrap());
            assert_eq!(p.result().content, "<think>Cogito</think>");
            assert_eq!(p.consume_rest(), "Ergo sum");
        }
    }

    mod dumped_args {
        use super::*;

        const BARELY_HEALABLE: &[&str] = &[
            "{",
            "{\"",
            "{\"n",
            "{\"name\"",
            "{\"name\":",
            "{\"name\":\"",
            "{\"name\":\"python",
        ];

        fn consume<'a>(
            input: &'a str,
            is_partial: bool,
            args_paths: &[&[&str]],
        ) -> (DumpedJson, ChatParser<'a>) {
            let mut p = ChatParser::new(input, is_partial, ChatSyntax::default());
            let result = p
                .try_consume_json_with_dumped_args(args_paths, &[])
                .unwrap()
                .expect("expected a JSON value");
            (result, p)
        }

        fn check(input: &str, expect_partial: bool, args_paths: &[&[&str]], expected: &str) {
            let (result, _p) = consume(input, true, args_paths);
            assert_eq!(result.is_partial, expect_partial, "input: {input}");
            let root_is_args = args_paths.len() == 1 && args_paths[0].is_empty();
            let rendered = if root_is_args {
                result.value.as_str().expect("root dump is a string").to_string()
            } else {
                serde_json::to_string(&result.value).unwrap()
            };
            assert_eq!(rendered, expected, "input: {input}");
        }

        #[test]
        fn clean_json_with_no_paths_passes_through() {
            check(r#"{"name": "python"}"#, false, &[], r#"{"name":"python"}"#);
        }

        #[test]
        fn clean_json_as_root_arguments_is_dumped() {
            check(r#"{"name": "python"}"#, false, &[&[]], r#"{"name":"python"}"#);
        }

        #[test]
        fn healed_content_outside_args_paths_is_dropped() {
            for src in BARELY_HEALABLE {
                check(src, true, &[&["arguments"]], "{}");
            }
        }

        #[test]
        fn complete_content_outside_args_paths_is_kept() {
            check(
                r#"{"name": "python""#,
                true,
                &[&["arguments"]],
                r#"{"name":"python"}"#,
            );
        }

        #[test]
        fn root_arguments_keep_their_own_partial_content() {
            check(r#"{"name": "python"#, true, &[&[]], r#"{"name":"python"#);
            for src in BARELY_HEALABLE {
                check(src, true, &[&[]], src);
            }
        }

        #[rstest]
        #[case(false)]
        #[case(true)]
        fn full_json_with_args_is_dumped_whole(#[case] parse_as_partial: bool) {
            let input = r#"{"name": "python", "args": {"arg1": 1}}"#;
            let mut p = ChatParser::new(input, parse_as_partial, ChatSyntax::default());
            let result = p
                .try_consume_json_with_dumped_args(&[&["args"]], &[])
                .unwrap()
                .unwrap();
            assert!(!result.is_partial);
            assert_eq!(
                serde_json::to_string(&result.value).unwrap(),
                r#"{"name":"python","args":"{\"arg1\":1}"}"#
            );
        }

        #[rstest]
        #[case(r#"{"foo": "bar", "args": {""#, r#"{"foo":"bar","args":"{\""}"#)]
        #[case(r#"{"foo": "bar", "args": {"ar"#, r#"{"foo":"bar","args":"{\"ar"}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1""#, r#"{"foo":"bar","args":"{\"arg1\""}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1":"#, r#"{"foo":"bar","args":"{\"arg1\":"}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1": "#, r#"{"foo":"bar","args":"{\"arg1\":"}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1": 1"#, r#"{"foo":"bar","args":"{\"arg1\":"}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1": 1 "#, r#"{"foo":"bar","args":"{\"arg1\":1"}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1": ""#, r#"{"foo":"bar","args":"{\"arg1\":\""}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1": "1""#, r#"{"foo":"bar","args":"{\"arg1\":\"1\""}"#)]
        #[case(r#"{"foo": "bar", "args": ["#, r#"{"foo":"bar","args":"["}"#)]
        #[case(r#"{"foo": "bar", "args": [1"#, r#"{"foo":"bar","args":"["}"#)]
        #[case(r#"{"foo": "bar", "args": [1 "#, r#"{"foo":"bar","args":"[1"}"#)]
        #[case(r#"{"foo": "bar", "args": ["1""#, r#"{"foo":"bar","args":"[\"1\""}"#)]
        #[case(r#"{"foo": "bar", "args": [1,"#, r#"{"foo":"bar","args":"[1,"}"#)]
        #[case(r#"{"foo": "bar", "args": {"arg1": ["#, r#"{"foo":"bar","args":"{\"arg1\":["}"#)]
        fn partial_args_are_dumped_up_to_the_last_known_character(
            #[case] input: &str,
            #[case] expected: &str,
        ) {
            let (result, _p) = consume(input, true, &[&["args"]]);
            assert!(result.is_partial, "input: {input}");
            assert_eq!(serde_json::to_string(&result.value).unwrap(), expected);
        }

        #[test]
        fn healed_json_in_non_partial_mode_is_incomplete() {
            let mut p = ChatParser::new(r#"{"a": "#, false, ChatSyntax::default());
            assert!(matches!(
                p.try_consume_json_with_dumped_args(&[], &[]),
                Err(ParseError::Incomplete(_))
            ));
        }

        #[test]
        fn content_paths_stream_partial_strings() {
            let input = r#"{"response": "Hel"#;
            let mut p = ChatParser::new(input, true, ChatSyntax::default());
            let result = p
                .try_consume_json_with_dumped_args(&[], &[&["response"]])
                .unwrap()
                .unwrap();
            assert!(result.is_partial);
            assert_eq!(result.value["response"], Value::String("Hel".to_string()));
        }
    }

    mod pruned_json {
        use super::*;

        #[test]
        fn healed_scalars_survive_pruning_untouched() {
            let mut p = ChatParser::new(r#""print('hey"#, true, ChatSyntax::default());
            let parsed = p.try_consume_json(&[]).unwrap().unwrap();
            let expected = format!("print('hey{}", parsed.healing_marker.marker);
            assert_eq!(parsed.value, Value::String(expected));
        }

        #[test]
        fn healed_object_leaves_are_pruned_to_marker_placeholders() {
            let input = r#"{"config": {"a": "xy"#;
            let mut p = ChatParser::new(input, true, ChatSyntax::default());
            let parsed = p.try_consume_json(&[]).unwrap().unwrap();
            let marker = parsed.healing_marker.marker.clone();
            assert_eq!(parsed.healing_marker.dump_marker, marker);
            assert_eq!(parsed.value["config"][&marker], Value::from(1));
        }

        #[test]
        fn whitelisted_paths_keep_partial_values() {
            let input = r#"{"config": {"a": "xy"#;
            let mut p = ChatParser::new(input, true, ChatSyntax::default());
            let parsed = p.try_consume_json(&[&["config"]]).unwrap().unwrap();
            let marker = parsed.healing_marker.marker.clone();
            assert_eq!(
                parsed.value["config"]["a"],
                Value::String(format!("xy{marker}"))
            );
        }
    }
}
