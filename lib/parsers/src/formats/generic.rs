// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fallback dialect for templates without a native convention: the whole
//! output is one JSON object shaped `{"tool_call": {...}}`,
//! `{"tool_calls": [...]}` or `{"response": ...}`.

use crate::error::ParseError;
use crate::parser::ChatParser;

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    if !p.syntax().parse_tool_calls {
        let rest = p.consume_rest();
        p.add_content(rest);
        return Ok(());
    }

    let data = p.consume_json_with_dumped_args(
        &[
            &["tool_call", "arguments"],
            &["tool_calls", "arguments"],
        ],
        &[&["response"]],
    )?;

    if let Some(tool_calls) = data.value.get("tool_calls") {
        if !p.add_tool_calls(tool_calls) || data.is_partial {
            return Err(p.incomplete("incomplete tool calls"));
        }
    } else if let Some(tool_call) = data.value.get("tool_call") {
        if !p.add_tool_call_from_json(tool_call) || data.is_partial {
            return Err(p.incomplete("incomplete tool call"));
        }
    } else if let Some(response) = data.value.get("response") {
        match response.as_str() {
            Some(text) => p.add_content(text),
            None => {
                let dumped =
                    serde_json::to_string(response).expect("JSON value serialization");
                p.add_content(&dumped);
            }
        }
        if data.is_partial {
            return Err(p.incomplete("incomplete response"));
        }
    } else {
        return Err(p.incomplete("expected `tool_call`, `tool_calls` or `response` in JSON"));
    }
    Ok(())
}
