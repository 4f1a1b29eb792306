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

//! C3: the Packet Builder (§4.3). Assembles the upstream `RequestEnvelope`
//! from a reordered history, the declared tools, and the session hint, then
//! runs C1 over the embedded tool schemas and rewrites `server_message_data`
//! subtrees to their wire form.

use either::Either;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::model::{ChatMessage, SessionState, ToolDefinition};
use crate::schema_sanitizer::sanitize_envelope;
use crate::server_message_data;
use crate::settings::DEFAULT_MODEL;

/// Inputs the packet builder needs beyond the reordered history, per §4.3.
pub struct PacketInputs<'a> {
    /// The reordered chat history (output of C2).
    pub history: &'a [ChatMessage],
    /// The caller's declared tools, if any.
    pub tools: &'a [ToolDefinition],
    /// The caller's requested model id, if any.
    pub model: Option<&'a str>,
    /// The current session hint (§3 `SessionState`).
    pub session: &'a SessionState,
}

fn message_to_text(msg: &ChatMessage) -> String {
    msg.content_as_text()
}

/// Map one historical message (system messages are filtered by the caller,
/// which joins them into `input.system_prompt` instead) into its upstream
/// message shape, per the §6 mapping table.
fn history_entry_to_upstream(msg: &ChatMessage) -> Option<Value> {
    match msg {
        ChatMessage::System { .. } => None,
        ChatMessage::User { .. } => Some(json!({
            "user_message": {"text": message_to_text(msg)}
        })),
        ChatMessage::Assistant {
            tool_calls: Some(calls),
            ..
        } if !calls.is_empty() => {
            let calls_json: Vec<Value> = calls
                .iter()
                .map(|c| {
                    let args: Value =
                        serde_json::from_str(&c.function.arguments).unwrap_or(json!({}));
                    json!({
                        "tool_call": {
                            "call_mcp_tool": {
                                "name": c.function.name,
                                "args": args,
                                "tool_call_id": c.id,
                            }
                        }
                    })
                })
                .collect();
            Some(json!({"agent_output": {"tool_calls": calls_json}}))
        }
        ChatMessage::Assistant { .. } => Some(json!({
            "agent_output": {"text": message_to_text(msg)}
        })),
        ChatMessage::Tool { tool_call_id, .. } => Some(json!({
            "tool_call_result": {
                "tool_call_id": tool_call_id,
                "content": message_to_text(msg),
            }
        })),
    }
}

/// Build the upstream request envelope per §4.3's assembly rules. Does not
/// touch `SessionState` (the caller decides when to snapshot/update it).
pub fn build_packet(inputs: &PacketInputs<'_>) -> Value {
    let task_id = inputs
        .session
        .baseline_task_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let system_prompt_text = inputs
        .history
        .iter()
        .filter(|m| m.is_system())
        .map(message_to_text)
        .collect::<Vec<_>>()
        .join("\n\n");

    // Every historical message maps into `messages` via the table below,
    // including the final user turn; that same turn's text is additionally
    // copied into `input.user_query`, not moved there.
    let messages: Vec<Value> = inputs
        .history
        .iter()
        .filter_map(history_entry_to_upstream)
        .collect();

    let final_user_text = final_user_text(inputs.history);

    let model = inputs
        .model
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let mcp_tools: Vec<Value> = inputs
        .tools
        .iter()
        .filter(|t| t.kind == "function")
        .map(|t| {
            json!({
                "name": t.function.name,
                "description": t.function.description.clone().unwrap_or_default(),
                "input_schema": t.function.parameters,
            })
        })
        .collect();

    let mut packet = json!({
        "task_context": {
            "tasks": [{
                "id": task_id,
                "description": "",
                "status": {"in_progress": {}},
                "messages": messages,
            }],
            "active_task_id": task_id,
        },
        "input": {
            "user_query": final_user_text,
            "system_prompt": system_prompt_text,
        },
        "settings": {
            "model_config": {"base": model},
        },
        "metadata": {},
        "mcp_context": {
            "tools": mcp_tools,
        },
    });

    if let Some(conversation_id) = &inputs.session.conversation_id {
        packet["metadata"]["conversation_id"] = json!(conversation_id);
    }

    sanitize_envelope(&mut packet);
    server_message_data::encode_in_place(&mut packet);
    packet
}

/// Extract the final user turn's plain content for convenience, mirroring
/// what [`build_packet`] places into `input.user_query`. Used by callers
/// (e.g. the non-streaming aggregator's logging) that want the same text
/// without re-deriving it.
pub fn final_user_text(history: &[ChatMessage]) -> String {
    history
        .iter()
        .rev()
        .find_map(|m| match m {
            ChatMessage::User { .. } => Some(message_to_text(m)),
            _ => None,
        })
        .unwrap_or_default()
}
