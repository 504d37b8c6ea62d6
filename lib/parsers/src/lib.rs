// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Parsing of streamed chat-completion output into structured assistant
//! messages: free-form content, reasoning ("thinking") segments, and tool
//! calls with stringified JSON arguments.
//!
//! The raw token stream is re-parsed on every chunk with `is_partial = true`;
//! [`parse`] always produces a well-formed message whose fields are monotone
//! prefixes of the final ones, and [`compute_diffs`] turns two successive
//! messages into the per-chunk deltas a streaming endpoint emits. Three
//! pieces make the truncation handling work:
//!
//! - [`regex_partial`]: regex search that can answer "this could still become
//!   a match" instead of a premature no;
//! - [`json_partial`]: a JSON parser that completes truncated prefixes and
//!   marks where synthetic content begins;
//! - [`parser`]: the cursor-based driver whose primitives the per-model
//!   dialect handlers compose.

pub mod diff;
pub mod error;
mod formats;
pub mod json_partial;
pub mod message;
pub mod parser;
pub mod regex_partial;
pub mod syntax;

pub use diff::{compute_diffs, MessageDiff};
pub use error::{DiffError, ParseError};
pub use json_partial::{HealingMarker, ParsedJson};
pub use message::{ChatMessage, ContentPart, ToolCall};
pub use parser::{ChatParser, ConsumeResult, DumpedJson, FindResult};
pub use regex_partial::{MatchKind, PartialRegex, RegexMatch, StringRange};
pub use syntax::{ChatFormat, ChatSyntax, ReasoningFormat};

/// Parses one model output into a [`ChatMessage`] under the given syntax.
///
/// With `is_partial = true` the input is treated as a stream prefix: the
/// returned message is well-formed but possibly truncated, and re-parsing a
/// longer prefix only ever extends its fields. With `is_partial = false` any
/// undecidable state or leftover input is an error.
pub fn parse(
    input: &str,
    is_partial: bool,
    syntax: &ChatSyntax,
) -> Result<ChatMessage, ParseError> {
    let mut parser = ChatParser::new(input, is_partial, syntax.clone());
    match formats::parse_message(&mut parser) {
        Ok(()) => Ok(parser.into_message()),
        Err(ParseError::Incomplete(reason)) if is_partial => {
            // The driver already finalized the truncated message.
            tracing::debug!(%reason, "partial parse");
            Ok(parser.into_message())
        }
        Err(err) => Err(err),
    }
}
