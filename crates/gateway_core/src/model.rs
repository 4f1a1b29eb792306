/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The data model §3 describes: chat messages, tool definitions, and the
//! request envelope, all owned (no borrowed lifetimes; the pipeline holds
//! these across await points).

use either::Either;
use serde::{Deserialize, Serialize};

/// One segment of a multi-part message content list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A plain text segment.
    Text {
        /// The text.
        text: String,
    },
    /// An image reference segment.
    ImageUrl {
        /// The image URL payload.
        image_url: ImageUrlPayload,
    },
}

/// The `image_url` object nested in a [`ContentPart::ImageUrl`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageUrlPayload {
    /// The URL itself (may be a data URI).
    pub url: String,
}

/// Message content: either a plain string or an ordered list of typed
/// segments, per §3.
pub type Content = Either<String, Vec<ContentPart>>;

/// A single function-call record on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssistantFunctionStub {
    /// The function name the assistant chose to call.
    pub name: String,
    /// The JSON-encoded arguments string.
    pub arguments: String,
}

/// A tool call emitted by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssistantToolCall {
    /// The id the caller correlates the eventual tool result against.
    pub id: String,
    #[serde(rename = "type")]
    /// Always `"function"` today; kept as a field so unknown future kinds
    /// round-trip instead of being rejected.
    pub kind: String,
    /// The function stub describing the call.
    pub function: AssistantFunctionStub,
}

/// One message in a chat history, tagged by role per §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    /// A system prompt.
    System {
        /// The system text.
        content: Content,
        /// Optional speaker name.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// A user turn.
    User {
        /// The user's content.
        content: Content,
        /// Optional speaker name.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// An assistant turn, optionally carrying tool calls instead of (or
    /// alongside) text content.
    Assistant {
        /// The assistant's text content, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Content>,
        /// Optional speaker name.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Tool calls the assistant issued.
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<AssistantToolCall>>,
    },
    /// A tool result. Invariant (§3): `tool_call_id` is always set here.
    Tool {
        /// The tool's result content.
        content: Content,
        /// The id of the tool call this result answers.
        tool_call_id: String,
    },
}

impl ChatMessage {
    /// The content rendered to a plain string, the way every downstream
    /// upstream-message shape wants it (§6 mapping table).
    pub fn content_as_text(&self) -> String {
        let content = match self {
            ChatMessage::System { content, .. } => Some(content),
            ChatMessage::User { content, .. } => Some(content),
            ChatMessage::Assistant { content, .. } => content.as_ref(),
            ChatMessage::Tool { content, .. } => Some(content),
        };
        match content {
            Some(Either::Left(text)) => text.clone(),
            Some(Either::Right(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        }
    }

    /// `true` for [`ChatMessage::System`].
    pub fn is_system(&self) -> bool {
        matches!(self, ChatMessage::System { .. })
    }

    /// `true` for [`ChatMessage::Tool`].
    pub fn is_tool(&self) -> bool {
        matches!(self, ChatMessage::Tool { .. })
    }
}

/// A callable tool as declared by the caller (only `type == "function"` is
/// attached to the upstream envelope, per §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    /// The tool kind; only `"function"` is forwarded upstream.
    pub kind: String,
    /// The function stub.
    pub function: FunctionStub,
}

/// The `{name, description, input_schema}` body of a tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionStub {
    /// The tool's name.
    pub name: String,
    /// A human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The JSON-Schema describing the tool's arguments.
    #[serde(default = "default_schema")]
    pub parameters: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({})
}

/// The process-global, opportunistically-updated correlator described in
/// §3. `None` fields mean "no hint yet".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The upstream-assigned conversation id, once known.
    pub conversation_id: Option<String>,
    /// The task id to reuse as the baseline for the next turn.
    pub baseline_task_id: Option<String>,
}
