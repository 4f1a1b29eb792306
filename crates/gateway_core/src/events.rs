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

//! The upstream's tagged-union event shapes (§3, §9 "Tagged event unions").
//! Represented as real sum types rather than string dispatch, with an
//! opaque fallback so the translator stays forward-compatible with event
//! shapes it doesn't yet know about.
//!
//! Decoded events use inconsistent casing (snake_case/camelCase); `from_json`
//! uses the duck-typed [`get_either`] helper rather than pre-normalizing, so
//! outbound re-serialization (where it matters) preserves caller casing.

use serde_json::Value;

/// Look up `snake` or `camel` on a JSON object, whichever is present. Per
/// §9, this is deliberately not a normalizing rewrite of the whole tree,
/// only a lookup helper.
pub fn get_either<'a>(obj: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    obj.get(snake).or_else(|| obj.get(camel))
}

/// One action inside a `client_actions` event (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// A new task was created.
    CreateTask,
    /// Streamed assistant text.
    AppendToMessageContent {
        /// The text fragment to append.
        text: String,
    },
    /// One or more messages (possibly tool calls/results) were added to a
    /// task.
    AddMessagesToTask {
        /// The task these messages belong to, if present.
        task_id: Option<String>,
        /// The messages themselves, left undecoded (C5 interprets them).
        messages: Vec<Value>,
    },
    /// A tool call request, when it doesn't arrive nested inside
    /// `add_messages_to_task` (kept as its own variant since §3 lists it as
    /// a distinct action tag).
    ToolCall(Value),
    /// A tool call result.
    ToolResponse(Value),
    /// An action tag this gateway doesn't recognize, passed through raw so
    /// the translator remains forward-compatible (§9).
    Unknown(Value),
}

impl ClientAction {
    /// Parse one action object from the upstream's JSON.
    pub fn from_json(value: &Value) -> ClientAction {
        let Some(obj) = value.as_object() else {
            return ClientAction::Unknown(value.clone());
        };
        if obj.contains_key("create_task") || obj.contains_key("createTask") {
            return ClientAction::CreateTask;
        }
        if let Some(inner) = get_either(value, "append_to_message_content", "appendToMessageContent") {
            let text = get_either(inner, "message", "message")
                .and_then(|m| get_either(m, "agent_output", "agentOutput"))
                .and_then(|a| get_either(a, "text", "text"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return ClientAction::AppendToMessageContent { text };
        }
        if let Some(inner) = get_either(value, "add_messages_to_task", "addMessagesToTask") {
            let task_id = get_either(inner, "task_id", "taskId")
                .and_then(Value::as_str)
                .map(String::from);
            let messages = get_either(inner, "messages", "messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return ClientAction::AddMessagesToTask { task_id, messages };
        }
        if let Some(inner) = get_either(value, "tool_call", "toolCall") {
            return ClientAction::ToolCall(inner.clone());
        }
        if let Some(inner) = get_either(value, "tool_response", "toolResponse") {
            return ClientAction::ToolResponse(inner.clone());
        }
        ClientAction::Unknown(value.clone())
    }
}

/// The top-level decoded upstream event (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// The upstream assigned (or reaffirmed) conversation/task identifiers.
    Init {
        /// The conversation correlator.
        conversation_id: Option<String>,
        /// The task correlator.
        task_id: Option<String>,
    },
    /// One or more client actions.
    ClientActions(Vec<ClientAction>),
    /// The upstream signaled completion.
    Finished,
    /// An event tag this gateway doesn't recognize (§4.4: "Unknown event
    /// tags pass through as raw").
    Opaque(Value),
}

impl UpstreamEvent {
    /// Parse one decoded frame payload into an [`UpstreamEvent`] (§3, §4.4).
    pub fn from_json(value: &Value) -> UpstreamEvent {
        let Some(obj) = value.as_object() else {
            return UpstreamEvent::Opaque(value.clone());
        };
        if let Some(init) = get_either(value, "init", "init") {
            let conversation_id = get_either(init, "conversation_id", "conversationId")
                .and_then(Value::as_str)
                .map(String::from);
            let task_id = get_either(init, "task_id", "taskId")
                .and_then(Value::as_str)
                .map(String::from);
            return UpstreamEvent::Init {
                conversation_id,
                task_id,
            };
        }
        if obj.contains_key("finished") {
            return UpstreamEvent::Finished;
        }
        if let Some(ca) = get_either(value, "client_actions", "clientActions") {
            let actions = get_either(ca, "actions", "actions")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(ClientAction::from_json).collect())
                .unwrap_or_default();
            return UpstreamEvent::ClientActions(actions);
        }
        UpstreamEvent::Opaque(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_init_event_snake_case() {
        let value = json!({"init": {"conversation_id": "c1", "task_id": "t1"}});
        let event = UpstreamEvent::from_json(&value);
        assert_eq!(
            event,
            UpstreamEvent::Init {
                conversation_id: Some("c1".to_string()),
                task_id: Some("t1".to_string())
            }
        );
    }

    #[test]
    fn parses_init_event_camel_case() {
        let value = json!({"init": {"conversationId": "c1", "taskId": "t1"}});
        let event = UpstreamEvent::from_json(&value);
        assert_eq!(
            event,
            UpstreamEvent::Init {
                conversation_id: Some("c1".to_string()),
                task_id: Some("t1".to_string())
            }
        );
    }

    #[test]
    fn parses_finished_event() {
        let value = json!({"finished": {}});
        assert_eq!(UpstreamEvent::from_json(&value), UpstreamEvent::Finished);
    }

    #[test]
    fn parses_append_to_message_content_action() {
        let value = json!({
            "client_actions": {
                "actions": [
                    {"append_to_message_content": {"message": {"agent_output": {"text": "hello"}}}}
                ]
            }
        });
        let event = UpstreamEvent::from_json(&value);
        match event {
            UpstreamEvent::ClientActions(actions) => {
                assert_eq!(actions.len(), 1);
                assert_eq!(
                    actions[0],
                    ClientAction::AppendToMessageContent {
                        text: "hello".to_string()
                    }
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_add_messages_to_task_camel_case() {
        let value = json!({
            "clientActions": {
                "actions": [
                    {"addMessagesToTask": {"taskId": "t1", "messages": [{"toolCall": {}}]}}
                ]
            }
        });
        let event = UpstreamEvent::from_json(&value);
        match event {
            UpstreamEvent::ClientActions(actions) => match &actions[0] {
                ClientAction::AddMessagesToTask { task_id, messages } => {
                    assert_eq!(task_id.as_deref(), Some("t1"));
                    assert_eq!(messages.len(), 1);
                }
                other => panic!("unexpected action: {other:?}"),
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_tag_is_opaque() {
        let value = json!({"something_else": {"x": 1}});
        assert_eq!(UpstreamEvent::from_json(&value), UpstreamEvent::Opaque(value));
    }
}
