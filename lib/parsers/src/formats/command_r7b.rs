// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Command R7B: `<|START_THINKING|>` reasoning, `<|START_RESPONSE|>` content
//! and `<|START_ACTION|>` carrying an array of
//! `{"tool_call_id", "tool_name", "parameters"}` objects.

use std::sync::OnceLock;

use serde_json::Value;

use crate::error::ParseError;
use crate::parser::ChatParser;
use crate::regex_partial::PartialRegex;

fn start_action_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"<\|START_ACTION\|>").expect("action open pattern"))
}

fn end_action_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"\s*<\|END_ACTION\|>").expect("action close pattern"))
}

fn start_response_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"<\|START_RESPONSE\|>").expect("response open pattern"))
}

fn end_response_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"<\|END_RESPONSE\|>").expect("response close pattern"))
}

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    p.try_parse_reasoning("<|START_THINKING|>", "<|END_THINKING|>")?;

    if let Some(res) = p.try_find_regex(start_action_regex(), None)? {
        p.add_content(res.prelude);
        let tool_calls = p.consume_json_with_dumped_args(&[&["parameters"]], &[])?;
        let Some(items) = tool_calls.value.as_array() else {
            return Err(p.incomplete("expected an action array"));
        };
        let mut complete = true;
        for item in items {
            let name = item.get("tool_name").and_then(Value::as_str).unwrap_or("");
            let id = item
                .get("tool_call_id")
                .and_then(Value::as_str)
                .unwrap_or("");
            let arguments = match item.get("parameters") {
                None => String::new(),
                Some(Value::String(dumped)) => dumped.clone(),
                Some(value) => {
                    serde_json::to_string(value).expect("JSON value serialization")
                }
            };
            if !p.add_tool_call(name, id, &arguments) {
                complete = false;
            }
        }
        if !complete || tool_calls.is_partial {
            return Err(p.incomplete("incomplete tool call"));
        }
        p.consume_regex(end_action_regex())?;
    } else if let Some(res) = p.try_find_regex(start_response_regex(), None)? {
        p.add_content(res.prelude);
        match p.try_find_regex(end_response_regex(), None)? {
            Some(inner) => p.add_content(inner.prelude),
            None => {
                let rest = p.consume_rest();
                p.add_content(rest);
                return Err(p.incomplete("expected <|END_RESPONSE|>"));
            }
        }
    } else {
        let rest = p.consume_rest();
        p.add_content(rest);
    }
    Ok(())
}
