// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-model dialect handlers: small recipes composed from the driver's
//! primitives. Each module documents the token convention it recognizes.

mod command_r7b;
mod deepseek_r1;
mod firefunction;
mod functionary;
mod generic;
mod hermes;
mod llama3;
mod mistral_nemo;


use crate::error::ParseError;
use crate::parser::ChatParser;
use crate::regex_partial::{PartialRegex, StringRange};
use crate::syntax::ChatFormat;

pub(crate) fn parse_message(p: &mut ChatParser) -> Result<(), ParseError> {
    tracing::debug!(
        format = p.syntax().format.name(),
        is_partial = p.is_partial(),
        "parsing chat output"
    );
    match p.syntax().format {
        ChatFormat::ContentOnly => content_only(p)?,
        ChatFormat::Generic => generic::parse(p)?,
        ChatFormat::MistralNemo => mistral_nemo::parse(p)?,
        ChatFormat::FireFunctionV2 => firefunction::parse(p)?,
        ChatFormat::FunctionaryV3_2 => functionary::parse(p)?,
        ChatFormat::Llama3x => llama3::parse(p)?,
        ChatFormat::DeepSeekR1 => deepseek_r1::parse(p)?,
        ChatFormat::CommandR7b => command_r7b::parse(p)?,
        ChatFormat::Hermes2Pro => hermes::parse(p)?,
    }
    p.finish()
}

fn content_only(p: &mut ChatParser) -> Result<(), ParseError> {
    p.try_parse_reasoning("<think>", "</think>")?;
    let rest = p.consume_rest();
    p.add_content(rest);
    Ok(())
}

/// `PREFIX[{"name": ..., "arguments": {...}}, ...]` streams: find the prefix,
/// take everything before it as content, then read the call array.
/// `keep_bytes` backs the cursor up so a prefix that swallowed the `[` leaves
/// it for the JSON parser.
pub(super) fn parse_prefixed_json_tool_call_array(
    p: &mut ChatParser,
    prefix: &PartialRegex,
    keep_bytes: usize,
) -> Result<(), ParseError> {
    match p.try_find_regex(prefix, None)? {
        Some(res) => {
            p.add_content(res.prelude);
            p.move_back(keep_bytes)?;
            let tool_calls = p.consume_json_with_dumped_args(&[&["arguments"]], &[])?;
            if !p.add_tool_calls(&tool_calls.value) || tool_calls.is_partial {
                return Err(p.incomplete("incomplete tool calls array"));
            }
            Ok(())
        }
        None => {
            let rest = p.consume_rest();
            p.add_content(rest);
            Ok(())
        }
    }
}

type GetFunctionName =
    dyn Fn(&mut ChatParser, &[StringRange]) -> Result<String, ParseError>;

/// The workhorse behind the JSON-arguments dialects: scan for function
/// openers, read each payload with dumped arguments, close with the dialect's
/// terminator, and push the remainder as content.
///
/// `function_start_only` anchors the first call at the cursor (routing-token
/// dialects); `function_regex` locates subsequent (or all) calls anywhere
/// ahead. `get_function_name` may veto a match by returning an empty name,
/// which resumes the scan one byte further. With `allow_raw_python`, a call
/// named `python` whose payload is not JSON swallows the rest of the input as
/// code.
#[allow(clippy::too_many_arguments)]
pub(super) fn parse_json_tool_calls(
    p: &mut ChatParser,
    block_open: Option<&PartialRegex>,
    function_start_only: Option<&PartialRegex>,
    function_regex: Option<&PartialRegex>,
    close_regex: &PartialRegex,
    block_close: Option<&PartialRegex>,
    allow_raw_python: bool,
    get_function_name: Option<&GetFunctionName>,
) -> Result<(), ParseError> {
    if let Some(block_open) = block_open {
        match p.try_find_regex(block_open, None)? {
            Some(res) => {
                p.add_content(res.prelude);
            }
            None => {
                let rest = p.consume_rest();
                p.add_content(rest);
                return Ok(());
            }
        }
    }

    let mut first = true;
    let mut from: Option<usize> = None;
    loop {
        let groups = if first && function_start_only.is_some() {
            p.try_consume_regex(function_start_only.unwrap())?
                .map(|res| res.groups)
        } else if let Some(function_regex) = function_regex {
            match p.try_find_regex(function_regex, from)? {
                Some(res) => {
                    p.add_content(res.prelude);
                    Some(res.groups)
                }
                None => None,
            }
        } else {
            None
        };
        let Some(groups) = groups else {
            break;
        };

        let name = match get_function_name {
            Some(get_function_name) => get_function_name(p, &groups)?,
            None => p.slice(groups[1]).to_string(),
        };
        first = false;

        if name.is_empty() {
            // The callback vetoed this match; treat it as content and scan on.
            from = Some(groups[0].begin + 1);
            continue;
        }
        from = None;

        let maybe_raw_python = allow_raw_python && name == "python";
        if p.input().as_bytes().get(p.pos()) == Some(&b'{') || !maybe_raw_python {
            if let Some(arguments) = p.try_consume_json_with_dumped_args(&[&[]], &[])? {
                let dumped = arguments.value.as_str().unwrap_or_default().to_string();
                if !p.add_tool_call(&name, "", &dumped) || arguments.is_partial {
                    return Err(p.incomplete("incomplete tool call"));
                }
                p.consume_regex(close_regex)?;
            }
            continue;
        }
        let code = p.consume_rest().to_string();
        let arguments = wrap_code_as_arguments(p, &code);
        if !p.add_tool_call(&name, "", &arguments) {
            return Err(p.incomplete("incomplete tool call"));
        }
        return Ok(());
    }

    if let Some(block_close) = block_close {
        p.consume_regex(block_close)?;
    }
    p.consume_spaces();
    let rest = p.consume_rest();
    p.add_content(rest);
    Ok(())
}

/// Wraps raw interpreter code as a `{"code": "..."}` arguments string. In
/// partial mode the healing marker bounds the text so the dump can be cut at
/// the last fully-known character.
pub(super) fn wrap_code_as_arguments(p: &ChatParser, code: &str) -> String {
    if p.is_partial() {
        let bounded = format!("{code}{}", p.healing_marker());
        let dumped = format!(
            "{{\"code\": {}}}",
            serde_json::to_string(&bounded).expect("JSON string serialization")
        );
        let idx = dumped
            .find(p.healing_marker())
            .expect("marker survives a JSON string dump");
        dumped[..idx].to_string()
    } else {
        format!(
            "{{\"code\": {}}}",
            serde_json::to_string(code).expect("JSON string serialization")
        )
    }
}
