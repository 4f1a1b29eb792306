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

//! C2: the History Reorderer (§4.2). Demotes orphaned `tool` messages to
//! `user` messages and otherwise preserves caller order; never fails.

use crate::model::ChatMessage;

/// Does `assistant` declare a tool call matching `tool_call_id`?
fn assistant_has_matching_call(assistant: &ChatMessage, tool_call_id: &str) -> bool {
    match assistant {
        ChatMessage::Assistant {
            tool_calls: Some(calls),
            ..
        } => calls.iter().any(|c| c.id == tool_call_id),
        _ => false,
    }
}

/// Find the nearest preceding `assistant` message in `history[..index]`,
/// skipping over interleaved `system` messages but stopping at the first
/// non-system, non-assistant message (§4.2a: "immediately preceded,
/// ignoring interleaved system messages").
fn preceding_assistant(history: &[ChatMessage], index: usize) -> Option<&ChatMessage> {
    for msg in history[..index].iter().rev() {
        match msg {
            ChatMessage::System { .. } => continue,
            ChatMessage::Assistant { .. } => return Some(msg),
            _ => return None,
        }
    }
    None
}

/// Reorder/canonicalize an inbound chat history per §4.2. Orphaned `tool`
/// messages (no immediately-preceding assistant message with a matching
/// `tool_call_id`) are demoted to `user` messages whose content is wrapped
/// as `"[tool result <id>]: <text>"`. Every other message is preserved in
/// caller order. This operation never fails and is idempotent: running it
/// again over its own output is a no-op, since a demoted message is no
/// longer a `tool` message.
pub fn reorder_history(history: &[ChatMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .enumerate()
        .map(|(index, msg)| match msg {
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                let matched = preceding_assistant(history, index)
                    .map(|a| assistant_has_matching_call(a, tool_call_id))
                    .unwrap_or(false);
                if matched {
                    msg.clone()
                } else {
                    let text = msg.content_as_text();
                    let _ = content;
                    ChatMessage::User {
                        content: either::Either::Left(format!(
                            "[tool result {tool_call_id}]: {text}"
                        )),
                        name: None,
                    }
                }
            }
            other => other.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssistantFunctionStub, AssistantToolCall};
    use either::Either;

    fn user(text: &str) -> ChatMessage {
        ChatMessage::User {
            content: Either::Left(text.to_string()),
            name: None,
        }
    }

    fn assistant_with_call(id: &str) -> ChatMessage {
        ChatMessage::Assistant {
            content: None,
            name: None,
            tool_calls: Some(vec![AssistantToolCall {
                id: id.to_string(),
                kind: "function".to_string(),
                function: AssistantFunctionStub {
                    name: "search".to_string(),
                    arguments: "{}".to_string(),
                },
            }]),
        }
    }

    fn tool(id: &str, text: &str) -> ChatMessage {
        ChatMessage::Tool {
            content: Either::Left(text.to_string()),
            tool_call_id: id.to_string(),
        }
    }

    #[test]
    fn preserves_order_for_matched_tool_result() {
        let history = vec![user("q"), assistant_with_call("tc1"), tool("tc1", "result")];
        let reordered = reorder_history(&history);
        assert_eq!(reordered.len(), 3);
        assert!(matches!(reordered[2], ChatMessage::Tool { .. }));
    }

    #[test]
    fn demotes_orphan_tool_message_to_user() {
        let history = vec![user("q"), tool("missing", "r"), ChatMessage::Assistant {
            content: Some(Either::Left("a".to_string())),
            name: None,
            tool_calls: None,
        }];
        let reordered = reorder_history(&history);
        match &reordered[1] {
            ChatMessage::User { content, .. } => {
                assert_eq!(
                    content,
                    &Either::Left("[tool result missing]: r".to_string())
                );
            }
            other => panic!("expected demoted user message, got {other:?}"),
        }
    }

    #[test]
    fn skips_interleaved_system_messages_when_matching() {
        let history = vec![
            assistant_with_call("tc1"),
            ChatMessage::System {
                content: Either::Left("note".to_string()),
                name: None,
            },
            tool("tc1", "result"),
        ];
        let reordered = reorder_history(&history);
        assert!(matches!(reordered[2], ChatMessage::Tool { .. }));
    }

    #[test]
    fn is_idempotent() {
        let history = vec![user("q"), tool("missing", "r")];
        let once = reorder_history(&history);
        let twice = reorder_history(&once);
        assert_eq!(once, twice);
    }
}
