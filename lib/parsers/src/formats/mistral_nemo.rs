// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Mistral-Nemo: `[TOOL_CALLS][{"name": ..., "arguments": {...}, "id": ...}]`.

use std::sync::OnceLock;

use crate::error::ParseError;
use crate::parser::ChatParser;
use crate::regex_partial::PartialRegex;

fn prefix_regex() -> &'static PartialRegex {
    static RE: OnceLock<PartialRegex> = OnceLock::new();
    RE.get_or_init(|| {
        PartialRegex::new(&regex::escape("[TOOL_CALLS]")).expect("mistral-nemo prefix pattern")
    })
}

pub(super) fn parse(p: &mut ChatParser) -> Result<(), ParseError> {
    if !p.syntax().parse_tool_calls {
        let rest = p.consume_rest();
        p.add_content(rest);
        return Ok(());
    }
    super::parse_prefixed_json_tool_call_array(p, prefix_regex(), 0)
}
