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

//! C5: the SSE Translator (§4.5). Turns a stream of [`UpstreamEvent`]s into
//! OpenAI-compatible `chat.completion.chunk` frames (streaming mode) or a
//! single aggregated `chat.completion` object (non-streaming mode), per the
//! `OPENED -> STREAMING -> (TERMINATED_OK | TERMINATED_ERROR)` state
//! machine.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::BoxStream;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::events::{get_either, ClientAction, UpstreamEvent};

/// The envelope every chunk (and the aggregated response) shares:
/// `{id, object, created, model}` (§4.5).
#[derive(Debug, Clone)]
pub struct TranslatorContext {
    /// A fresh UUID v4 per request.
    pub id: String,
    /// Unix seconds at request start.
    pub created: i64,
    /// The caller's requested model string, echoed back.
    pub model: String,
}

impl TranslatorContext {
    /// Build a context with a fresh id and the given model/creation time.
    pub fn new(model: impl Into<String>, created: i64) -> Self {
        TranslatorContext {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            created,
            model: model.into(),
        }
    }
}

/// One `choices[0].delta` payload.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ChunkDelta {
    /// Present only on the opening chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Present on content chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Present on tool-call chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One streamed tool-call delta (§4.5 rule 3).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCallDelta {
    /// Always 0 in this gateway (single-choice responses only).
    pub index: u32,
    /// The upstream-supplied id, or a fresh UUID v4 if absent.
    pub id: String,
    #[serde(rename = "type")]
    /// Always `"function"`.
    pub kind: String,
    /// The name/arguments of the call.
    pub function: FunctionCallDelta,
}

/// The `function` object nested in a [`ToolCallDelta`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionCallDelta {
    /// The tool name.
    pub name: String,
    /// The JSON-encoded arguments string.
    pub arguments: String,
}

/// An error surfaced inside a terminal chunk (§4.5 TERMINATED_ERROR).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChunkError {
    pub message: String,
}

/// One `choices[0]` entry of a streamed chunk.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionChunkChoice {
    /// Always 0.
    pub index: u32,
    /// The incremental delta this chunk carries.
    pub delta: ChunkDelta,
    /// Set only on the terminal chunk.
    pub finish_reason: Option<String>,
}

/// One `chat.completion.chunk` SSE data payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionChunk {
    /// Shared across every chunk in one response (§4.5).
    pub id: String,
    /// Always `"chat.completion.chunk"`.
    pub object: &'static str,
    /// Unix seconds at request start, shared across every chunk.
    pub created: i64,
    /// Echoes the caller's requested model.
    pub model: String,
    /// Always a single-element list; this gateway has no `n > 1` support.
    pub choices: Vec<ChatCompletionChunkChoice>,
    /// Set only on the TERMINATED_ERROR chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ChunkError>,
}

/// A frame the translator emits: either a chunk, or the literal `[DONE]`
/// sentinel that always comes last (§4.5 rule 5).
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A `chat.completion.chunk` payload.
    Chunk(ChatCompletionChunk),
    /// The terminal `[DONE]` sentinel.
    Done,
}

fn finish_reason(tool_call_emitted: bool) -> &'static str {
    if tool_call_emitted {
        "tool_calls"
    } else {
        "stop"
    }
}

struct ExtractedToolCall {
    id: String,
    name: String,
    args: Value,
}

/// Pull `{name, args, tool_call_id}` out of one `add_messages_to_task`
/// message, accepting either casing (§3, §9). Returns `None` when
/// `tool_call.call_mcp_tool.name` is absent, per §4.5 rule 3.
fn extract_tool_call(message: &Value) -> Option<ExtractedToolCall> {
    let tool_call = get_either(message, "tool_call", "toolCall")?;
    let call = get_either(tool_call, "call_mcp_tool", "callMcpTool")?;
    let name = get_either(call, "name", "name")?.as_str()?.to_string();
    let args = get_either(call, "args", "args").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let id = get_either(call, "tool_call_id", "toolCallId")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    Some(ExtractedToolCall { id, name, args })
}

/// Consumes one [`UpstreamEvent`] and classifies it into zero or more
/// content/tool-call chunk deltas, per §4.5 rules 2-3. Shared by both the
/// streaming translator and the non-streaming aggregator so the two modes
/// can never disagree about what counts as a "tool call" or "content".
enum Classified {
    Content(String),
    ToolCall(ExtractedToolCall),
}

fn classify_client_action(action: &ClientAction) -> Vec<Classified> {
    match action {
        ClientAction::AppendToMessageContent { text } if !text.is_empty() => {
            vec![Classified::Content(text.clone())]
        }
        ClientAction::AddMessagesToTask { messages, .. } => messages
            .iter()
            .filter_map(extract_tool_call)
            .map(Classified::ToolCall)
            .collect(),
        _ => vec![],
    }
}

fn classify_event(event: &UpstreamEvent) -> Vec<Classified> {
    match event {
        UpstreamEvent::ClientActions(actions) => {
            actions.iter().flat_map(classify_client_action).collect()
        }
        _ => vec![],
    }
}

/// The streaming translator: a [`Stream`] of [`SseFrame`]s built from a
/// stream of decoded upstream events. Implements the OPENED -> STREAMING ->
/// TERMINATED state machine (§4.5) directly as a hand-rolled `Stream` impl
/// so that an upstream event carrying several classified deltas (e.g. an
/// `add_messages_to_task` batch) can fan out into several emitted frames
/// without losing strict arrival ordering.
pub struct ChunkTranslator {
    inner: BoxStream<'static, Result<UpstreamEvent, GatewayError>>,
    pending: VecDeque<SseFrame>,
    opened: bool,
    done: bool,
    tool_call_emitted: bool,
    next_tool_index: u32,
    ctx: TranslatorContext,
}

impl ChunkTranslator {
    /// Build a translator over `inner`, tagging every chunk with `ctx`.
    pub fn new(inner: BoxStream<'static, Result<UpstreamEvent, GatewayError>>, ctx: TranslatorContext) -> Self {
        ChunkTranslator {
            inner,
            pending: VecDeque::new(),
            opened: false,
            done: false,
            tool_call_emitted: false,
            next_tool_index: 0,
            ctx,
        }
    }

    fn base_chunk(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.ctx.id.clone(),
            object: "chat.completion.chunk",
            created: self.ctx.created,
            model: self.ctx.model.clone(),
            choices: vec![ChatCompletionChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(String::from),
            }],
            error: None,
        }
    }

    fn opening_chunk(&self) -> ChatCompletionChunk {
        self.base_chunk(
            ChunkDelta {
                role: Some("assistant".to_string()),
                content: None,
                tool_calls: None,
            },
            None,
        )
    }

    fn terminal_chunk(&self) -> ChatCompletionChunk {
        self.base_chunk(ChunkDelta::default(), Some(finish_reason(self.tool_call_emitted)))
    }

    fn terminal_error_chunk(&self, err: &GatewayError) -> ChatCompletionChunk {
        let mut chunk = self.base_chunk(ChunkDelta::default(), Some("error"));
        chunk.error = Some(ChunkError {
            message: err.terminal_message(),
        });
        chunk
    }

    fn push_classified(&mut self, items: Vec<Classified>) {
        for item in items {
            match item {
                Classified::Content(text) => {
                    self.pending.push_back(SseFrame::Chunk(self.base_chunk(
                        ChunkDelta {
                            role: None,
                            content: Some(text),
                            tool_calls: None,
                        },
                        None,
                    )));
                }
                Classified::ToolCall(call) => {
                    self.tool_call_emitted = true;
                    let index = self.next_tool_index;
                    self.next_tool_index += 1;
                    let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
                    self.pending.push_back(SseFrame::Chunk(self.base_chunk(
                        ChunkDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ToolCallDelta {
                                index,
                                id: call.id,
                                kind: "function".to_string(),
                                function: FunctionCallDelta {
                                    name: call.name,
                                    arguments,
                                },
                            }]),
                        },
                        None,
                    )));
                }
            }
        }
    }

    fn finish(&mut self, terminal: ChatCompletionChunk) {
        self.pending.push_back(SseFrame::Chunk(terminal));
        self.pending.push_back(SseFrame::Done);
        self.done = true;
    }
}

impl Stream for ChunkTranslator {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if !this.opened {
            this.opened = true;
            return Poll::Ready(Some(SseFrame::Chunk(this.opening_chunk())));
        }

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(frame));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(UpstreamEvent::Finished))) => {
                    let terminal = this.terminal_chunk();
                    this.finish(terminal);
                }
                Poll::Ready(Some(Ok(event))) => {
                    let classified = classify_event(&event);
                    this.push_classified(classified);
                }
                Poll::Ready(Some(Err(err))) => {
                    let terminal = this.terminal_error_chunk(&err);
                    this.finish(terminal);
                }
                Poll::Ready(None) => {
                    let terminal = this.terminal_chunk();
                    this.finish(terminal);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Build the streaming translator over a decoded upstream event stream
/// (§4.5).
pub fn translate_stream(
    events: BoxStream<'static, Result<UpstreamEvent, GatewayError>>,
    ctx: TranslatorContext,
) -> ChunkTranslator {
    ChunkTranslator::new(events, ctx)
}

/// One `choices[0].message` of an aggregated (non-streaming) response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One `choices[0]` of an aggregated response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionAggregateChoice {
    pub index: u32,
    pub message: ChatCompletionMessage,
    pub finish_reason: &'static str,
}

/// A single aggregated `chat.completion` object (§4.5 "Aggregation mode").
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionAggregateChoice>,
}

/// Consume the full event stream and build one aggregated [`ChatCompletion`]
/// (§4.5 "Aggregation mode"): same classification rules as the streaming
/// translator, but text is concatenated and tool calls collected instead of
/// emitted incrementally.
pub async fn aggregate(
    mut events: BoxStream<'static, Result<UpstreamEvent, GatewayError>>,
    ctx: TranslatorContext,
) -> Result<ChatCompletion, GatewayError> {
    use futures::StreamExt;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut next_index = 0u32;

    loop {
        match events.next().await {
            Some(Ok(UpstreamEvent::Finished)) | None => break,
            Some(Ok(event)) => {
                for item in classify_event(&event) {
                    match item {
                        Classified::Content(text) => content.push_str(&text),
                        Classified::ToolCall(call) => {
                            let arguments =
                                serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
                            tool_calls.push(ToolCallDelta {
                                index: next_index,
                                id: call.id,
                                kind: "function".to_string(),
                                function: FunctionCallDelta {
                                    name: call.name,
                                    arguments,
                                },
                            });
                            next_index += 1;
                        }
                    }
                }
            }
            Some(Err(err)) => return Err(err),
        }
    }

    let finish = finish_reason(!tool_calls.is_empty());
    Ok(ChatCompletion {
        id: ctx.id,
        object: "chat.completion",
        created: ctx.created,
        model: ctx.model,
        choices: vec![ChatCompletionAggregateChoice {
            index: 0,
            message: ChatCompletionMessage {
                role: "assistant",
                content: if content.is_empty() { None } else { Some(content) },
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            finish_reason: finish,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use futures::StreamExt;
    use serde_json::json;

    fn ctx() -> TranslatorContext {
        TranslatorContext::new("gpt-test", 1_700_000_000)
    }

    fn events_stream(
        events: Vec<Result<UpstreamEvent, GatewayError>>,
    ) -> BoxStream<'static, Result<UpstreamEvent, GatewayError>> {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn minimal_streaming_echo_matches_scenario_one() {
        let events = events_stream(vec![
            Ok(UpstreamEvent::Init {
                conversation_id: Some("c1".to_string()),
                task_id: Some("t1".to_string()),
            }),
            Ok(UpstreamEvent::ClientActions(vec![ClientAction::AppendToMessageContent {
                text: "hello".to_string(),
            }])),
            Ok(UpstreamEvent::Finished),
        ]);
        let frames: Vec<SseFrame> = translate_stream(events, ctx()).collect().await;
        assert_eq!(frames.len(), 4);
        match &frames[0] {
            SseFrame::Chunk(c) => assert_eq!(c.choices[0].delta.role.as_deref(), Some("assistant")),
            _ => panic!("expected opening chunk"),
        }
        match &frames[1] {
            SseFrame::Chunk(c) => assert_eq!(c.choices[0].delta.content.as_deref(), Some("hello")),
            _ => panic!("expected content chunk"),
        }
        match &frames[2] {
            SseFrame::Chunk(c) => assert_eq!(c.choices[0].finish_reason.as_deref(), Some("stop")),
            _ => panic!("expected terminal chunk"),
        }
        assert_eq!(frames[3], SseFrame::Done);
    }

    #[tokio::test]
    async fn tool_call_streaming_matches_scenario_two() {
        let message = json!({
            "tool_call": {"call_mcp_tool": {"name": "search", "args": {"q": "x"}, "tool_call_id": "tc1"}}
        });
        let events = events_stream(vec![
            Ok(UpstreamEvent::ClientActions(vec![ClientAction::AddMessagesToTask {
                task_id: None,
                messages: vec![message],
            }])),
            Ok(UpstreamEvent::Finished),
        ]);
        let frames: Vec<SseFrame> = translate_stream(events, ctx()).collect().await;
        match &frames[1] {
            SseFrame::Chunk(c) => {
                let call = &c.choices[0].delta.tool_calls.as_ref().unwrap()[0];
                assert_eq!(call.id, "tc1");
                assert_eq!(call.function.name, "search");
                assert_eq!(call.function.arguments, "{\"q\":\"x\"}");
            }
            _ => panic!("expected tool call chunk"),
        }
        match &frames[2] {
            SseFrame::Chunk(c) => assert_eq!(c.choices[0].finish_reason.as_deref(), Some("tool_calls")),
            _ => panic!("expected terminal chunk"),
        }
    }

    #[tokio::test]
    async fn non_streaming_aggregation_matches_scenario_three() {
        let events = events_stream(vec![
            Ok(UpstreamEvent::ClientActions(vec![ClientAction::AppendToMessageContent {
                text: "hello".to_string(),
            }])),
            Ok(UpstreamEvent::Finished),
        ]);
        let result = aggregate(events, ctx()).await.unwrap();
        assert_eq!(result.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(result.choices[0].finish_reason, "stop");
    }

    #[tokio::test]
    async fn mid_stream_error_yields_terminal_error_chunk_then_done() {
        let events = events_stream(vec![
            Ok(UpstreamEvent::ClientActions(vec![ClientAction::AppendToMessageContent {
                text: "partial".to_string(),
            }])),
            Err(GatewayError::UpstreamTransport("connection reset".to_string())),
        ]);
        let frames: Vec<SseFrame> = translate_stream(events, ctx()).collect().await;
        let last_chunk = frames.iter().rev().nth(1).unwrap();
        match last_chunk {
            SseFrame::Chunk(c) => {
                assert_eq!(c.choices[0].finish_reason.as_deref(), Some("error"));
                assert!(c.error.is_some());
            }
            _ => panic!("expected terminal error chunk"),
        }
        assert_eq!(*frames.last().unwrap(), SseFrame::Done);
    }

    #[tokio::test]
    async fn stream_always_ends_with_done_even_without_finished_event() {
        let events = events_stream(vec![Ok(UpstreamEvent::ClientActions(vec![]))]);
        let frames: Vec<SseFrame> = translate_stream(events, ctx()).collect().await;
        assert_eq!(*frames.last().unwrap(), SseFrame::Done);
    }

    #[tokio::test]
    async fn empty_append_text_emits_no_content_chunk() {
        let events = events_stream(vec![
            Ok(UpstreamEvent::ClientActions(vec![ClientAction::AppendToMessageContent {
                text: String::new(),
            }])),
            Ok(UpstreamEvent::Finished),
        ]);
        let frames: Vec<SseFrame> = translate_stream(events, ctx()).collect().await;
        // opening + terminal + done, no content chunk in between.
        assert_eq!(frames.len(), 3);
    }
}
