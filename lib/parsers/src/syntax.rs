// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// The model-specific token convention used to delimit content, reasoning and
/// tool calls in a raw completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChatFormat {
    /// No tool-call convention: the whole output is content (with optional
    /// reasoning tags).
    ContentOnly,
    /// `{"tool_call": {...}}`, `{"tool_calls": [...]}` or `{"response": "..."}`.
    Generic,
    /// `[TOOL_CALLS][{"name": ..., "arguments": {...}}]`.
    MistralNemo,
    /// `functools[{"name": ..., "arguments": {...}}]`.
    FireFunctionV2,
    /// `NAME\n{...}` routing tokens, `>>>NAME\n{...}` continuations,
    /// `python\n<code>` and `all\n<content>`.
    FunctionaryV3_2,
    /// `<|python_tag|>name.call(...)` builtins or bare
    /// `{"name": ..., "parameters": {...}}`.
    Llama3x,
    /// `<think>` reasoning and `<｜tool▁calls▁begin｜>` blocks.
    DeepSeekR1,
    /// `<|START_THINKING|>` / `<|START_RESPONSE|>` / `<|START_ACTION|>` spans.
    CommandR7b,
    /// `<tool_call>` wrappers and their many community variants.
    Hermes2Pro,
}

static FORMAT_MAP: OnceLock<HashMap<&'static str, ChatFormat>> = OnceLock::new();

fn format_map() -> &'static HashMap<&'static str, ChatFormat> {
    FORMAT_MAP.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("Content-Only", ChatFormat::ContentOnly);
        map.insert("Generic", ChatFormat::Generic);
        map.insert("Mistral-Nemo", ChatFormat::MistralNemo);
        map.insert("FireFunction-v2", ChatFormat::FireFunctionV2);
        map.insert("Functionary-v3.2", ChatFormat::FunctionaryV3_2);
        map.insert("Llama-3.x", ChatFormat::Llama3x);
        map.insert("DeepSeek-R1", ChatFormat::DeepSeekR1);
        map.insert("Command-R7B", ChatFormat::CommandR7b);
        map.insert("Hermes-2-Pro", ChatFormat::Hermes2Pro);
        map
    })
}

impl ChatFormat {
    /// The stable external name of this format.
    pub fn name(&self) -> &'static str {
        match self {
            ChatFormat::ContentOnly => "Content-Only",
            ChatFormat::Generic => "Generic",
            ChatFormat::MistralNemo => "Mistral-Nemo",
            ChatFormat::FireFunctionV2 => "FireFunction-v2",
            ChatFormat::FunctionaryV3_2 => "Functionary-v3.2",
            ChatFormat::Llama3x => "Llama-3.x",
            ChatFormat::DeepSeekR1 => "DeepSeek-R1",
            ChatFormat::CommandR7b => "Command-R7B",
            ChatFormat::Hermes2Pro => "Hermes-2-Pro",
        }
    }

    pub fn available_formats() -> Vec<&'static str> {
        format_map().keys().copied().collect()
    }

    /// Resolves a stable external name back to its format tag.
    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        match format_map().get(name) {
            Some(format) => Ok(*format),
            None => anyhow::bail!(
                "Format '{}' is not implemented. Available formats: {:?}",
                name,
                Self::available_formats()
            ),
        }
    }
}

/// How reasoning ("thinking") segments are delimited, if at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasoningFormat {
    #[default]
    None,
    /// `<think>...</think>` tags, possibly left open by the prompt template.
    DeepSeek,
}

/// Everything the driver needs to know about the stream being parsed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSyntax {
    pub format: ChatFormat,
    pub reasoning_format: ReasoningFormat,
    /// Surface reasoning inside `content`, wrapped in `<think>` tags, instead
    /// of the separate `reasoning_content` field.
    pub reasoning_in_content: bool,
    /// The prompt template already emitted the opening think tag, so the
    /// message starts inside a reasoning block.
    pub thinking_forced_open: bool,
    pub parse_tool_calls: bool,
}

impl Default for ChatSyntax {
    fn default() -> Self {
        Self {
            format: ChatFormat::ContentOnly,
            reasoning_format: ReasoningFormat::None,
            reasoning_in_content: false,
            thinking_forced_open: false,
            parse_tool_calls: true,
        }
    }
}

impl ChatSyntax {
    pub fn with_format(format: ChatFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_round_trips_through_its_name() {
        for name in ChatFormat::available_formats() {
            let format = ChatFormat::from_name(name).unwrap();
            assert_eq!(format.name(), name);
        }
    }

    #[test]
    fn unknown_format_name_reports_available_formats() {
        let err = ChatFormat::from_name("Hermes-9000").unwrap_err();
        assert!(err.to_string().contains("Available formats"));
    }
}
