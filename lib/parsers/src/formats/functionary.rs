// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Functionary v3.2. The message starts with a routing token: `all\n` routes
//! the remainder to plain content, `NAME\n{...}` is a call, `python\n<code>`
//! is an interpreter call whose raw code gets wrapped as arguments. Further
//! calls are introduced by `>>>NAME\n`.

use std::sync::OnceLock;

use crate::error::ParseError;
use crate::parser::ChatParser;
use crate::regex_partial::{PartialRegex, StringRange};

fn function_start_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new(r"(\w+\n\{|python\n|all\n)").expect("functionary start pattern")
    })
}

fn function_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new(r">>>(\w+\n\{|python\n|all\n)").expect("functionary call pattern")
    })
}

fn close_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| PartialRegex::new(r"\s*").expect("functionary close pattern"))
}

fn function_name(p: &mut ChatParser, groups: &[StringRange]) -> Result<String, ParseError> {
    let at_start = groups[0].begin == 0;
    let name = p.slice(groups[1]).to_string();
    if name.ends_with('{') {
        // Leave the opening brace for the JSON parser.
        p.move_back(1)?;
    }
    if at_start && name == "all\n" {
        return Ok(String::new());
    }
    Ok(name.trim_end_matches(['\n', '{']).to_string())
}

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    if !p.syntax().parse_tool_calls {
        let rest = p.consume_rest();
        p.add_content(rest);
        return Ok(());
    }
    super::parse_json_tool_calls(
        p,
        None,
        Some(function_start_regex()),
        Some(function_regex()),
        close_regex(),
        None,
        true,
        Some(&function_name),
    )
}
