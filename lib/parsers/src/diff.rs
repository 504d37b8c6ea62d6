// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::error::DiffError;
use crate::message::{ChatMessage, ToolCall};

/// The incremental change between two successive parses of the same stream.
///
/// Each diff carries at most one of: a content delta, a reasoning delta, or a
/// per-tool-call delta (`tool_call_index` set). Streaming endpoints map each
/// diff to one SSE chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDiff {
    pub content_delta: String,
    pub reasoning_content_delta: String,
    pub tool_call_index: Option<usize>,
    pub tool_call_delta: ToolCall,
}

/// Computes the per-field suffix of `current` over `previous`.
///
/// `current` must be a monotone extension of `previous`: re-parsing a longer
/// prefix of the same stream only ever appends to content, reasoning and
/// tool-call fields. A field that instead *shrank* to a prefix of its old
/// value yields an empty delta (the previous parse had swallowed a partial
/// stop sequence that has now been erased). Any other divergence fails with
/// [`DiffError::Regression`].
pub fn compute_diffs(
    previous: &ChatMessage,
    current: &ChatMessage,
) -> Result<Vec<MessageDiff>, DiffError> {
    let mut diffs = Vec::new();

    if previous.reasoning_content != current.reasoning_content {
        let delta = string_diff(&previous.reasoning_content, &current.reasoning_content)?;
        if !delta.is_empty() {
            diffs.push(MessageDiff {
                reasoning_content_delta: delta,
                ..Default::default()
            });
        }
    }
    if previous.content != current.content {
        let delta = string_diff(&previous.content, &current.content)?;
        if !delta.is_empty() {
            diffs.push(MessageDiff {
                content_delta: delta,
                ..Default::default()
            });
        }
    }

    if previous.tool_calls.len() > current.tool_calls.len() {
        return Err(DiffError::Regression(format!(
            "tool call count went from {} to {}",
            previous.tool_calls.len(),
            current.tool_calls.len()
        )));
    }

    // Only the last pre-existing call can still be growing; earlier ones were
    // complete before the new call started.
    if let Some(prev_call) = previous.tool_calls.last() {
        let index = previous.tool_calls.len() - 1;
        let curr_call = &current.tool_calls[index];
        if prev_call.name != curr_call.name {
            return Err(DiffError::Regression(format!(
                "tool call {index} changed name from `{}` to `{}`",
                prev_call.name, curr_call.name
            )));
        }
        let arguments = string_diff(&prev_call.arguments, &curr_call.arguments)?;
        if !arguments.is_empty() || prev_call.id != curr_call.id {
            let mut delta = ToolCall {
                arguments,
                ..Default::default()
            };
            if prev_call.id != curr_call.id {
                // The name is unchanged (checked above); only the id is new.
                delta.id = curr_call.id.clone();
            }
            diffs.push(MessageDiff {
                tool_call_index: Some(index),
                tool_call_delta: delta,
                ..Default::default()
            });
        }
    }

    for index in previous.tool_calls.len()..current.tool_calls.len() {
        diffs.push(MessageDiff {
            tool_call_index: Some(index),
            tool_call_delta: current.tool_calls[index].clone(),
            ..Default::default()
        });
    }

    Ok(diffs)
}

fn string_diff(previous: &str, current: &str) -> Result<String, DiffError> {
    if previous.is_empty() {
        return Ok(current.to_string());
    }
    if let Some(suffix) = current.strip_prefix(previous) {
        return Ok(suffix.to_string());
    }
    if previous.starts_with(current) {
        // The previous parse ended on a partial stop sequence that the new
        // parse erased.
        return Ok(String::new());
    }
    Err(DiffError::Regression(format!(
        "`{previous}` is not a prefix of `{current}`"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str, reasoning: &str, tool_calls: Vec<ToolCall>) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.to_string(),
            reasoning_content: reasoning.to_string(),
            tool_calls,
            ..Default::default()
        }
    }

    fn call(name: &str, arguments: &str, id: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
            id: id.to_string(),
        }
    }

    fn apply(mut msg: ChatMessage, diffs: &[MessageDiff]) -> ChatMessage {
        for diff in diffs {
            msg.content.push_str(&diff.content_delta);
            msg.reasoning_content.push_str(&diff.reasoning_content_delta);
            if let Some(index) = diff.tool_call_index {
                if index == msg.tool_calls.len() {
                    msg.tool_calls.push(ToolCall::default());
                }
                let target = &mut msg.tool_calls[index];
                target.name.push_str(&diff.tool_call_delta.name);
                target.arguments.push_str(&diff.tool_call_delta.arguments);
                if !diff.tool_call_delta.id.is_empty() {
                    target.id = diff.tool_call_delta.id.clone();
                }
            }
        }
        msg
    }

    #[test]
    fn content_and_reasoning_deltas_are_suffixes() {
        let prev = msg("Hel", "thin", vec![]);
        let curr = msg("Hello", "thinking", vec![]);
        let diffs = compute_diffs(&prev, &curr).unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].reasoning_content_delta, "king");
        assert_eq!(diffs[1].content_delta, "lo");
        assert_eq!(apply(prev, &diffs), curr);
    }

    #[test]
    fn growing_tool_call_arguments_produce_one_delta() {
        let prev = msg("", "", vec![call("f", "{\"a\":", "")]);
        let curr = msg("", "", vec![call("f", "{\"a\":1}", "")]);
        let diffs = compute_diffs(&prev, &curr).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].tool_call_index, Some(0));
        assert_eq!(diffs[0].tool_call_delta.arguments, "1}");
        assert!(diffs[0].tool_call_delta.name.is_empty());
        assert_eq!(apply(prev, &diffs), curr);
    }

    #[test]
    fn id_arrival_does_not_resend_the_name() {
        let prev = msg("", "", vec![call("f", "{}", "")]);
        let curr = msg("", "", vec![call("f", "{}", "id1")]);
        let diffs = compute_diffs(&prev, &curr).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].tool_call_index, Some(0));
        assert_eq!(diffs[0].tool_call_delta.id, "id1");
        assert!(diffs[0].tool_call_delta.name.is_empty());
        assert!(diffs[0].tool_call_delta.arguments.is_empty());
        assert_eq!(apply(prev, &diffs), curr);
    }

    #[test]
    fn new_tool_calls_are_emitted_whole() {
        let prev = msg("", "", vec![call("f", "{}", "")]);
        let curr = msg("", "", vec![call("f", "{}", ""), call("g", "{\"x\":2}", "id1")]);
        let diffs = compute_diffs(&prev, &curr).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].tool_call_index, Some(1));
        assert_eq!(diffs[0].tool_call_delta, call("g", "{\"x\":2}", "id1"));
        assert_eq!(apply(prev, &diffs), curr);
    }

    #[test]
    fn identical_messages_produce_no_diffs() {
        let prev = msg("same", "", vec![call("f", "{}", "")]);
        assert!(compute_diffs(&prev, &prev.clone()).unwrap().is_empty());
    }

    #[test]
    fn erased_partial_stop_word_yields_empty_delta() {
        let prev = msg("Hello<", "", vec![]);
        let curr = msg("Hello", "", vec![]);
        assert!(compute_diffs(&prev, &curr).unwrap().is_empty());
    }

    #[test]
    fn divergent_content_is_a_regression() {
        let prev = msg("Hello", "", vec![]);
        let curr = msg("Goodbye", "", vec![]);
        assert!(matches!(
            compute_diffs(&prev, &curr),
            Err(DiffError::Regression(_))
        ));
    }

    #[test]
    fn dropped_tool_call_is_a_regression() {
        let prev = msg("", "", vec![call("f", "{}", "")]);
        let curr = msg("", "", vec![]);
        assert!(matches!(
            compute_diffs(&prev, &curr),
            Err(DiffError::Regression(_))
        ));
    }
}
