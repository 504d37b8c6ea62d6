// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Hermes-2-Pro and its descendants (Hermes 3, Qwen 2.5). The canonical
//! wrapper is `<tool_call>{"name": ..., "arguments": {...}}</tool_call>`, but
//! fine-tunes emit a zoo of variants: `<function_call>`, `<tool>`, `<tools>`,
//! `<response>`, `<json>`, `<xml>`, `<JSON>` wrappers, fenced ``` blocks with
//! an optional `xml`/`json` language tag, bare `{"name": ...}` objects, and
//! `<function=NAME>` / `<function name="NAME">` openers.

use std::sync::OnceLock;

use crate::error::ParseError;
use crate::parser::ChatParser;
use crate::regex_partial::PartialRegex;

fn open_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new(concat!(
            "(?:",
            "(```(?:xml|json)?\\n\\s*)?", // group 1: fenced block start
            "(",                          // group 2: wrapper tag
            "<tool_call>",
            "|<function_call>",
            "|<tool>",
            "|<tools>",
            "|<response>",
            "|<json>",
            "|<xml>",
            "|<JSON>",
            ")?",
            "(\\s*\\{\\s*\"name\")", // group 3: start of a named call object
            ")",
            "|<function=([^>]+)>",        // group 4
            "|<function name=\"([^\"]+)\">", // group 5
        ))
        .expect("hermes opener pattern")
    })
}

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    p.try_parse_reasoning("<think>", "</think>")?;
    if !p.syntax().parse_tool_calls {
        let rest = p.consume_rest();
        p.add_content(rest);
        return Ok(());
    }

    while let Some(res) = p.try_find_regex(open_regex(), None)? {
        p.add_content(res.prelude);

        let block_start = res.groups[1];
        let block_end = if block_start.is_empty() { "" } else { "```" };
        let open_tag = res.groups[2];

        if !res.groups[3].is_empty() {
            // `{"name": ...}` object, bare or wrapped: rewind to the brace and
            // hand the whole object to the JSON parser.
            p.move_to(res.groups[3].begin)?;
            let close_tag = if open_tag.is_empty() {
                String::new()
            } else {
                format!("</{}", &p.slice(open_tag)[1..])
            };
            let Some(tool_call) = p.try_consume_json_with_dumped_args(&[&["arguments"]], &[])?
            else {
                return Err(p.incomplete("failed to parse tool call"));
            };
            if !p.add_tool_call_from_json(&tool_call.value) || tool_call.is_partial {
                return Err(p.incomplete("incomplete tool call"));
            }
            p.consume_spaces();
            p.consume_literal(&close_tag)?;
            p.consume_spaces();
            if !block_end.is_empty() {
                p.consume_literal(block_end)?;
                p.consume_spaces();
            }
        } else {
            // `<function=NAME>` / `<function name="NAME">`: the payload is the
            // arguments object alone.
            let name_range = if !res.groups[4].is_empty() {
                res.groups[4]
            } else {
                res.groups[5]
            };
            let function_name = p.slice(name_range).to_string();
            let Some(arguments) = p.try_consume_json_with_dumped_args(&[&[]], &[])? else {
                return Err(p.incomplete("failed to parse tool call arguments"));
            };
            let dumped = arguments.value.as_str().unwrap_or_default().to_string();
            if !p.add_tool_call(&function_name, "", &dumped) || arguments.is_partial {
                return Err(p.incomplete("incomplete tool call"));
            }
            p.consume_spaces();
            p.consume_literal("</function>")?;
            p.consume_spaces();
            if !block_end.is_empty() {
                p.consume_literal(block_end)?;
                p.consume_spaces();
            }
        }
    }
    let rest = p.consume_rest();
    p.add_content(rest);
    Ok(())
}
