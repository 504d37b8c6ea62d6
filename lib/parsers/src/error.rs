// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

/// Errors produced while parsing a model's raw output into a chat message.
///
/// `Incomplete` is special: in partial mode it means "wait for more tokens"
/// and the driver has already finalized a well-formed truncated message
/// before returning it. Every other variant is terminal in both modes.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The cursor cannot advance with confidence on the input seen so far.
    #[error("incomplete parse: {0}")]
    Incomplete(String),

    /// A non-partial parse finished with unconsumed input left over.
    #[error("unexpected content at end of input: {0}")]
    UnexpectedTrailingContent(String),

    /// The input at the cursor is neither a valid JSON value nor a healable
    /// truncated prefix of one.
    #[error("invalid JSON at byte {position}: {message}")]
    InvalidJson { position: usize, message: String },

    /// A recognition pattern failed to compile, or uses a construct the
    /// partial-match rewriter does not support.
    #[error("invalid regex pattern `{pattern}`: {message}")]
    InvalidRegexPattern { pattern: String, message: String },

    /// A cursor move landed outside the input.
    #[error("position {pos} out of range for input of {len} bytes")]
    BadPosition { pos: usize, len: usize },
}

impl ParseError {
    pub(crate) fn invalid_pattern(pattern: &str, message: impl ToString) -> Self {
        Self::InvalidRegexPattern {
            pattern: pattern.to_string(),
            message: message.to_string(),
        }
    }
}

/// Failure computing a streaming delta between two successive messages.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The newer message does not extend the older one field-wise.
    #[error("regression in streamed message: {0}")]
    Regression(String),
}
