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

//! The OpenAI-compatible HTTP surface: `/v1/chat/completions`,
//! `/v1/models`, and `/v1/embeddings` (§6). Grounded on
//! `edgen_server::openai_shim`'s request/response shapes and its
//! `ChatCompletionResponse<S>` `Stream`/`Full` dispatch, with the wire
//! types this gateway actually pipelines through C1-C5 reused directly from
//! `gateway_core::model` rather than re-declared with borrowed lifetimes,
//! since this gateway has no zero-copy-parsing requirement, so the
//! teacher's `Cow<'a, str>` split between request and pipeline types
//! collapses into one owned shape.

use std::collections::hash_map::DefaultHasher;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use futures::StreamExt;
use gateway_core::model::{ChatMessage, SessionState, ToolDefinition};
use gateway_core::packet::PacketInputs;
use gateway_core::settings::GatewaySettings;
use gateway_core::translate::{self, ChatCompletion, SseFrame, TranslatorContext};
use gateway_core::{packet, reorder, session, GatewayError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorBody, HttpError};
use crate::AppState;

/// `POST /v1/chat/completions` request body (§6). Only the fields this
/// gateway's pipeline actually consumes are modeled; sampling parameters a
/// caller sends (`temperature`, `top_p`, ...) are accepted and ignored
/// rather than rejected, since the upstream (not this gateway) owns
/// sampling behavior.
#[derive(Debug, Deserialize)]
pub struct CreateChatCompletionRequest {
    /// The chat history (§3).
    pub messages: Vec<ChatMessage>,
    /// The requested model id, if any (§4.3).
    #[serde(default)]
    pub model: Option<String>,
    /// Whether to stream the response as SSE (§6).
    #[serde(default)]
    pub stream: bool,
    /// Declared tools, if any (§4.3).
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Query-string authentication parameter (§6: `api_key`).
#[derive(Debug, Deserialize, Default)]
pub struct AuthQuery {
    /// The shared secret, if passed as a query parameter.
    pub api_key: Option<String>,
}

/// Check the caller's shared secret against configured settings (§6).
/// Accepts `X-API-Key`, `api_key` query parameter, or
/// `Authorization: Bearer <secret>`. A no-op when no secret is configured.
pub fn check_auth(headers: &HeaderMap, query: &AuthQuery, settings: &GatewaySettings) -> Result<(), GatewayError> {
    if !settings.auth_enabled() {
        return Ok(());
    }
    let supplied = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| query.api_key.clone())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(String::from)
        });
    match supplied {
        Some(ref s) if s == &settings.api_key => Ok(()),
        _ => Err(GatewayError::AuthError),
    }
}

/// Either a streamed `text/event-stream` response or one aggregated JSON
/// completion, dispatched on the caller's `stream` flag. Grounded on
/// `edgen_server::openai_shim::ChatCompletionResponse<S>`.
pub enum ChatCompletionResponse<S> {
    /// `stream: true` (§6).
    Stream(Sse<S>),
    /// `stream: false` (default) (§6).
    Full(Box<Json<ChatCompletion>>),
}

impl<S> IntoResponse for ChatCompletionResponse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    fn into_response(self) -> Response {
        match self {
            ChatCompletionResponse::Stream(sse) => sse.into_response(),
            ChatCompletionResponse::Full(json) => json.into_response(),
        }
    }
}

fn frame_to_sse_event(frame: SseFrame) -> Event {
    match frame {
        SseFrame::Chunk(chunk) => Event::default().json_data(chunk).unwrap_or_else(|_| Event::default()),
        SseFrame::Done => Event::default().data("[DONE]"),
    }
}

/// `POST /v1/chat/completions` (§6). Drives C2 -> C3 -> C4 -> C5 (or the
/// aggregator) for one request.
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    responses(
        (status = 200, description = "OK, a single completion or an SSE stream of chunks"),
        (status = 400, description = "invalid request", body = ErrorBody),
        (status = 401, description = "missing or incorrect credentials", body = ErrorBody),
        (status = 502, description = "upstream failure", body = ErrorBody),
    ),
)]
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(auth_query): Query<AuthQuery>,
    Json(request): Json<CreateChatCompletionRequest>,
) -> Result<ChatCompletionResponse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    {
        let settings = gateway_core::settings::SETTINGS.read().await;
        check_auth(&headers, &auth_query, &settings)?;
    }

    if request.messages.is_empty() {
        return Err(HttpError(GatewayError::CallerError(
            "messages must not be empty".to_string(),
        )));
    }

    let reordered = reorder::reorder_history(&request.messages);
    let session_snapshot: SessionState = session::snapshot().await;
    let tools = request.tools.clone().unwrap_or_default();
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| gateway_core::settings::DEFAULT_MODEL.to_string());

    let envelope = packet::build_packet(&PacketInputs {
        history: &reordered,
        tools: &tools,
        model: Some(&model),
        session: &session_snapshot,
    });

    let events = state.streamer.open(&envelope).await?;
    let events = session::observe(events);

    let created = time::OffsetDateTime::now_utc().unix_timestamp();
    let ctx = TranslatorContext::new(model, created);

    if request.stream {
        let chunk_stream = translate::translate_stream(events, ctx).map(|frame| Ok(frame_to_sse_event(frame)));
        Ok(ChatCompletionResponse::Stream(Sse::new(chunk_stream)))
    } else {
        let completion = translate::aggregate(events, ctx).await?;
        Ok(ChatCompletionResponse::Full(Box::new(Json(completion))))
    }
}

/// One entry of `GET /v1/models`'s `data` list (§6 supplement).
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelListEntry {
    id: String,
    object: &'static str,
}

/// `GET /v1/models`'s response envelope (§6 supplement, grounded on
/// `protobuf2openai/router.py::list_models`'s local-fallback shape).
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelList {
    object: &'static str,
    data: Vec<ModelListEntry>,
}

/// `GET /v1/models` (§6 supplement). Echoes the single configured default
/// model id; there is no real model catalog behind this gateway.
#[utoipa::path(
    get,
    path = "/v1/models",
    responses((status = 200, description = "OK", body = ModelList)),
)]
pub async fn list_models() -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: vec![ModelListEntry {
            id: gateway_core::settings::DEFAULT_MODEL.to_string(),
            object: "model",
        }],
    })
}

/// `POST /v1/embeddings` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEmbeddingsRequest {
    /// The text to embed. Only a single string is supported (no batch
    /// input), matching the scope of the original's thin stand-in.
    pub input: String,
    /// The requested model id, echoed back unchanged.
    #[serde(default)]
    pub model: Option<String>,
}

/// One entry of `/v1/embeddings`'s `data` list.
#[derive(Debug, Serialize, ToSchema)]
pub struct EmbeddingEntry {
    object: &'static str,
    index: usize,
    embedding: Vec<f32>,
}

/// `/v1/embeddings`'s response envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct EmbeddingResponse {
    object: &'static str,
    model: String,
    data: Vec<EmbeddingEntry>,
}

const EMBEDDING_DIMENSIONS: usize = 32;

/// `POST /v1/embeddings` (§1, §9: "deliberately excluded... thin I/O", no
/// real embedding backend is wired in). Grounded on
/// `protobuf2openai/router.py::create_embeddings`: a deterministic
/// pseudo-random vector seeded from a hash of the input text, not a true
/// embedding.
#[utoipa::path(
    post,
    path = "/v1/embeddings",
    request_body = CreateEmbeddingsRequest,
    responses((status = 200, description = "OK", body = EmbeddingResponse)),
)]
pub async fn create_embeddings(Json(request): Json<CreateEmbeddingsRequest>) -> Json<EmbeddingResponse> {
    let mut hasher = DefaultHasher::new();
    request.input.hash(&mut hasher);
    let mut state = hasher.finish();

    let mut embedding = Vec::with_capacity(EMBEDDING_DIMENSIONS);
    for _ in 0..EMBEDDING_DIMENSIONS {
        // xorshift64*: cheap, deterministic, good enough for a stand-in
        // feature vector.
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let normalized = ((state % 2000) as f32 - 1000.0) / 1000.0;
        embedding.push(normalized);
    }

    Json(EmbeddingResponse {
        object: "list",
        model: request.model.unwrap_or_else(|| gateway_core::settings::DEFAULT_MODEL.to_string()),
        data: vec![EmbeddingEntry {
            object: "embedding",
            index: 0,
            embedding,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_disabled_allows_any_request() {
        let settings = GatewaySettings::default();
        let result = check_auth(&HeaderMap::new(), &AuthQuery::default(), &settings);
        assert!(result.is_ok());
    }

    #[test]
    fn auth_accepts_x_api_key_header() {
        let mut settings = GatewaySettings::default();
        settings.api_key = "secret".to_string();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert!(check_auth(&headers, &AuthQuery::default(), &settings).is_ok());
    }

    #[test]
    fn auth_accepts_bearer_header() {
        let mut settings = GatewaySettings::default();
        settings.api_key = "secret".to_string();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        assert!(check_auth(&headers, &AuthQuery::default(), &settings).is_ok());
    }

    #[test]
    fn auth_accepts_query_param() {
        let mut settings = GatewaySettings::default();
        settings.api_key = "secret".to_string();
        let query = AuthQuery {
            api_key: Some("secret".to_string()),
        };
        assert!(check_auth(&HeaderMap::new(), &query, &settings).is_ok());
    }

    #[test]
    fn auth_rejects_mismatch() {
        let mut settings = GatewaySettings::default();
        settings.api_key = "secret".to_string();
        let result = check_auth(&HeaderMap::new(), &AuthQuery::default(), &settings);
        assert!(matches!(result, Err(GatewayError::AuthError)));
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_for_same_input() {
        let req1 = CreateEmbeddingsRequest {
            input: "hello".to_string(),
            model: None,
        };
        let req2 = CreateEmbeddingsRequest {
            input: "hello".to_string(),
            model: None,
        };
        let resp1 = create_embeddings(Json(req1)).await;
        let resp2 = create_embeddings(Json(req2)).await;
        assert_eq!(resp1.0.data[0].embedding, resp2.0.data[0].embedding);
        assert_eq!(resp1.0.data[0].embedding.len(), EMBEDDING_DIMENSIONS);
    }

    #[tokio::test]
    async fn list_models_echoes_default_model() {
        let response = list_models().await;
        assert_eq!(response.0.data[0].id, gateway_core::settings::DEFAULT_MODEL);
    }
}
