// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! DeepSeek-R1: optional `<think>` reasoning, then tool calls wrapped as
//! `<｜tool▁calls▁begin｜><｜tool▁call▁begin｜>function<｜tool▁sep｜>NAME`
//! followed by a fenced ```json payload and the matching end tokens. The
//! block opener also accepts the historical spellings some checkpoints emit.

use std::sync::OnceLock;

use crate::error::ParseError;
use crate::parser::ChatParser;
use crate::regex_partial::PartialRegex;

fn tool_calls_begin_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new(
            "(?:<｜tool▁calls▁begin｜>|<｜tool_calls_begin｜>|<｜tool calls begin｜>|<｜tool\\\\_calls\\\\_begin｜>|<｜tool▁calls｜>)",
        )
        .expect("deepseek block open pattern")
    })
}

fn tool_calls_end_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new("\\s*<｜tool▁calls▁end｜>").expect("deepseek block close pattern")
    })
}

fn function_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new("(?:<｜tool▁call▁begin｜>)?function<｜tool▁sep｜>([^\n]+)\n```json\n")
            .expect("deepseek call pattern")
    })
}

fn close_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new("\\s*```\\s*(?:<｜tool▁call▁end｜>)?\\s*")
            .expect("deepseek close pattern")
    })
}

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    p.try_parse_reasoning("<think>", "</think>")?;
    if !p.syntax().parse_tool_calls {
        let rest = p.consume_rest();
        p.add_content(rest);
        return Ok(());
    }
    super::parse_json_tool_calls(
        p,
        Some(tool_calls_begin_regex()),
        None,
        Some(function_regex()),
        close_regex(),
        Some(tool_calls_end_regex()),
        false,
        None,
    )
}
