// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Llama 3.x tool calling: builtin tools as
//! `<|python_tag|>name.call(key=value, ...)`, and user-defined tools as a
//! bare `{"name": ..., "parameters": {...}}` object.

use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::json_partial::HealingMarker;
use crate::parser::ChatParser;
use crate::regex_partial::PartialRegex;

fn builtin_call_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"<\|python_tag\|>").expect("python tag pattern"))
}

fn function_name_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"\s*(\w+)\s*\.\s*call\(").expect("call pattern"))
}

fn arg_name_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"\s*(\w+)\s*=\s*").expect("argument pattern"))
}

fn function_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new(
            "\\s*\\{\\s*(?:\"type\"\\s*:\\s*\"function\"\\s*,\\s*)?\"name\"\\s*:\\s*\"([^\"]+)\"\\s*,\\s*\"parameters\"\\s*:\\s*",
        )
        .expect("llama3 call pattern")
    })
}

fn close_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"\s*\}\s*").expect("llama3 close pattern"))
}

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    if !p.syntax().parse_tool_calls {
        let rest = p.consume_rest();
        p.add_content(rest);
        return Ok(());
    }

    if let Some(res) = p.try_find_regex(builtin_call_regex(), None)? {
        p.add_content(res.prelude);
        if let Some(fun) = p.try_consume_regex(function_name_regex())? {
            let function_name = p.slice(fun.groups[1]).to_string();
            return parse_builtin_call(p, function_name);
        }
        // Some fine-tunes put the JSON form behind the python tag; fall
        // through and let the object parser pick it up right here.
    }

    super::parse_json_tool_calls(
        p,
        None,
        None,
        Some(function_regex()),
        close_regex(),
        None,
        false,
        None,
    )
}

/// `name.call(k1=v1, k2=v2, ...)` with each value a JSON literal. The healing
/// marker of the last (possibly truncated) value bounds the dumped arguments.
fn parse_builtin_call(p: &mut ChatParser, function_name: String) -> Result<(), ParseError> {
    let mut healing = HealingMarker::default();
    let mut args = Map::new();
    loop {
        let Some(arg) = p.try_consume_regex(arg_name_regex())? else {
            break;
        };
        let arg_name = p.slice(arg.groups[1]).to_string();
        let value = p.consume_json(&[])?;
        args.insert(arg_name, value.value);
        healing = value.healing_marker;
        p.consume_spaces();
        if !p.try_consume_literal(",") {
            break;
        }
    }
    p.consume_literal(")")?;
    p.consume_spaces();

    let arguments =
        serde_json::to_string(&Value::Object(args)).expect("JSON value serialization");
    if !p.add_tool_call_with_marker(&function_name, "", &arguments, &healing) {
        return Err(p.incomplete("incomplete tool call"));
    }
    Ok(())
}
