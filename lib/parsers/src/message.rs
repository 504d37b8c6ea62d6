// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// A single tool invocation requested by the model.
///
/// `arguments` is stringified JSON. During streaming it is a monotone prefix
/// of the final arguments text, truncated at a syntactic boundary; it never
/// contains healing-marker residue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
    pub id: String,
}

/// A typed fragment of message content. Mostly unused by the parsers (they
/// accumulate plain `content`), but part of the message shape expected by
/// OpenAI-compatible endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

/// The structured assistant message assembled from a raw completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub reasoning_content: String,
    pub content_parts: Vec<ContentPart>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_name: String,
    pub tool_call_id: String,
}

impl ChatMessage {
    pub(crate) fn assistant() -> Self {
        Self {
            role: "assistant".to_string(),
            ..Default::default()
        }
    }
}
