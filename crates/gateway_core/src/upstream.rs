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

//! C4: the Upstream Streamer (§4.4). Sends the encoded envelope, opens the
//! upstream's event stream, and yields decoded [`UpstreamEvent`]s in arrival
//! order. Quota-aware retry and exponential backoff live here; parsing a
//! single frame's payload (hex-or-base64url, whitespace-insignificant) is
//! `decode_frame_payload`, grounded on `warp2protobuf/warp/api_client.py`'s
//! `_parse_payload_bytes`.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::codec::SchemaRegistry;
use crate::error::GatewayError;
use crate::events::UpstreamEvent;
use crate::settings::GatewaySettings;

/// The upstream message type an encoded request envelope is tagged with.
pub const REQUEST_MESSAGE_TYPE: &str = "warp.multi_agent.v1.Request";
/// The upstream message type each decoded response frame is tagged with.
pub const RESPONSE_MESSAGE_TYPE: &str = "warp.multi_agent.v1.ResponseEvent";

const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 2;

/// The external credential-acquisition collaborator (§1, §6): a single
/// "fetch a usable bearer token" call, plus a refresh call used on a
/// recognized quota-exhaustion 429.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a bearer token, fetching and caching one if none is cached
    /// yet.
    async fn fetch_bearer_token(&self) -> Result<String, GatewayError>;

    /// Force a new bearer token, invalidating any cached one.
    async fn refresh_bearer_token(&self) -> Result<String, GatewayError>;
}

/// A credential provider that always returns the same configured token.
/// Stands in for the real credential-acquisition collaborator described in
/// §1/§6, which is explicitly out of scope for this crate.
pub struct StaticCredentialProvider {
    token: String,
}

impl StaticCredentialProvider {
    /// Build a provider that always yields `token`.
    pub fn new(token: impl Into<String>) -> Self {
        StaticCredentialProvider { token: token.into() }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch_bearer_token(&self) -> Result<String, GatewayError> {
        Ok(self.token.clone())
    }

    async fn refresh_bearer_token(&self) -> Result<String, GatewayError> {
        Ok(self.token.clone())
    }
}

/// A collaborator that knows how to acquire a fresh bearer token from the
/// (external) credential service. [`CachingCredentialProvider`] wraps one of
/// these with the lazy-fetch-then-cache behavior of
/// `warp2protobuf/core/auth.py::get_valid_jwt`.
#[async_trait::async_trait]
pub trait BearerTokenFetcher: Send + Sync {
    /// Acquire a brand-new bearer token.
    async fn fetch(&self) -> Result<String, GatewayError>;
}

/// Caches a fetched bearer token in a process-global-shaped `RwLock` cell so
/// most requests reuse it instead of re-fetching, refreshing only when C4
/// observes a recognized quota 429. Mirrors
/// `warp2protobuf/core/auth.py::get_valid_jwt`'s lazy-fetch-then-cache
/// behavior.
pub struct CachingCredentialProvider<F: BearerTokenFetcher> {
    fetcher: F,
    cached: tokio::sync::RwLock<Option<String>>,
}

impl<F: BearerTokenFetcher> CachingCredentialProvider<F> {
    /// Wrap `fetcher` with an empty cache.
    pub fn new(fetcher: F) -> Self {
        CachingCredentialProvider {
            fetcher,
            cached: tokio::sync::RwLock::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<F: BearerTokenFetcher> CredentialProvider for CachingCredentialProvider<F> {
    async fn fetch_bearer_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cached.read().await.clone() {
            return Ok(token);
        }
        let token = self.fetcher.fetch().await?;
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }

    async fn refresh_bearer_token(&self) -> Result<String, GatewayError> {
        let token = self.fetcher.fetch().await?;
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }
}

/// `true` when a 429 response body carries one of the recognized
/// quota-exhaustion phrases (§4.4).
pub fn is_quota_exhausted_body(body: &str) -> bool {
    body.contains("No remaining quota") || body.contains("No AI requests remaining")
}

/// Decode one frame's payload: strip all whitespace, then try hex, then
/// unpadded-then-padded base64url, falling back to standard base64.
/// Grounded on `warp2protobuf/warp/api_client.py::_parse_payload_bytes`.
pub fn decode_frame_payload(raw: &str) -> Option<Vec<u8>> {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return None;
    }
    if stripped.len() % 2 == 0 && stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(bytes) = data_encoding::HEXLOWER_PERMISSIVE.decode(stripped.as_bytes()) {
            return Some(bytes);
        }
    }
    if let Ok(bytes) = data_encoding::BASE64URL_NOPAD.decode(stripped.as_bytes()) {
        return Some(bytes);
    }
    let padded = pad_base64(&stripped);
    if let Ok(bytes) = data_encoding::BASE64URL.decode(padded.as_bytes()) {
        return Some(bytes);
    }
    data_encoding::BASE64.decode(padded.as_bytes()).ok()
}

fn pad_base64(s: &str) -> String {
    let remainder = s.len() % 4;
    let pad = if remainder == 0 { 0 } else { 4 - remainder };
    let mut padded = String::with_capacity(s.len() + pad);
    padded.push_str(s);
    padded.extend(std::iter::repeat('=').take(pad));
    padded
}

/// C4 itself: owns the HTTP client, the schema registry, and the
/// credential provider, and exposes [`UpstreamStreamer::open`].
pub struct UpstreamStreamer {
    client: reqwest::Client,
    registry: Arc<dyn SchemaRegistry>,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    identity_headers: Vec<(&'static str, String)>,
}

impl UpstreamStreamer {
    /// Build a streamer from process settings and the two facade
    /// collaborators.
    pub fn new(
        settings: &GatewaySettings,
        registry: Arc<dyn SchemaRegistry>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<UpstreamStreamer, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.read_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(settings.pool_idle_timeout_secs))
            .build()
            .map_err(|e| GatewayError::InternalError(e.to_string()))?;
        Ok(UpstreamStreamer {
            client,
            registry,
            credentials,
            base_url: settings.upstream_base_url.clone(),
            identity_headers: vec![
                ("x-client-version", settings.client_identity.client_version.clone()),
                ("x-os-category", settings.client_identity.os_category.clone()),
                ("x-os-version", settings.client_identity.os_version.clone()),
            ],
        })
    }

    fn build_request(&self, body: Vec<u8>, bearer: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/api/warp/send_stream_sse", self.base_url.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(url)
            .header("accept", "text/event-stream")
            .header("content-type", "application/x-protobuf")
            .header("authorization", format!("Bearer {bearer}"))
            .body(body);
        for (name, value) in &self.identity_headers {
            builder = builder.header(*name, value.clone());
        }
        builder
    }

    /// Encode `payload`, open the upstream stream (performing the
    /// quota-refresh-and-retry-once and exponential-backoff protocols
    /// synchronously before returning), and hand back a stream of decoded
    /// events. Errors returned from this function are pre-stream failures
    /// (§7 propagation policy) and should become an HTTP error response;
    /// errors yielded *from* the returned stream are mid-stream failures
    /// that C5 converts into a terminal error chunk.
    pub async fn open(
        &self,
        payload: &serde_json::Value,
    ) -> Result<BoxStream<'static, Result<UpstreamEvent, GatewayError>>, GatewayError> {
        let encoded = self.registry.encode(REQUEST_MESSAGE_TYPE, payload)?;
        let mut bearer = self.credentials.fetch_bearer_token().await?;
        let mut quota_retried = false;
        let mut transport_attempt = 0u32;

        loop {
            let builder = self.build_request(encoded.clone(), &bearer);
            let mut source = EventSource::new(builder)
                .map_err(|e| GatewayError::InternalError(e.to_string()))?;

            match source.next().await {
                Some(Ok(Event::Open)) => {
                    return Ok(Self::translate_stream(source, self.registry.clone()));
                }
                Some(Ok(Event::Message(_))) => {
                    // The upstream is not expected to send a payload before
                    // `Open`, but if it does there is nothing wrong with
                    // treating the connection as opened.
                    return Ok(Self::translate_stream(source, self.registry.clone()));
                }
                Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                    let body = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 && is_quota_exhausted_body(&body) && !quota_retried {
                        quota_retried = true;
                        tracing::warn!("upstream quota exhausted, refreshing bearer token");
                        bearer = self.credentials.refresh_bearer_token().await?;
                        continue;
                    }
                    if status.as_u16() == 429 {
                        return Err(GatewayError::UpstreamQuota(body));
                    }
                    return Err(GatewayError::UpstreamHTTP {
                        status: status.as_u16(),
                        body,
                    });
                }
                Some(Err(reqwest_eventsource::Error::Transport(err)))
                    if err.is_connect() || err.is_timeout() =>
                {
                    transport_attempt += 1;
                    if transport_attempt >= MAX_TRANSPORT_ATTEMPTS {
                        return Err(GatewayError::UpstreamTransport(err.to_string()));
                    }
                    let backoff = Duration::from_secs(BACKOFF_BASE_SECS.pow(transport_attempt));
                    tracing::warn!(attempt = transport_attempt, "upstream connect failed, backing off");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                Some(Err(err)) => {
                    return Err(GatewayError::UpstreamTransport(err.to_string()));
                }
                None => {
                    return Err(GatewayError::UpstreamTransport(
                        "stream ended before opening".to_string(),
                    ));
                }
            }
        }
    }

    fn translate_stream(
        mut source: EventSource,
        registry: Arc<dyn SchemaRegistry>,
    ) -> BoxStream<'static, Result<UpstreamEvent, GatewayError>> {
        Box::pin(futures::stream::poll_fn(move |cx| {
            loop {
                match source.poll_next_unpin(cx) {
                    std::task::Poll::Ready(Some(Ok(Event::Open))) => continue,
                    std::task::Poll::Ready(Some(Ok(Event::Message(message)))) => {
                        let data = message.data.trim();
                        if data == "[DONE]" {
                            source.close();
                            return std::task::Poll::Ready(None);
                        }
                        match decode_frame_payload(data) {
                            Some(bytes) => match registry.decode(RESPONSE_MESSAGE_TYPE, &bytes) {
                                Ok(value) => {
                                    let event = UpstreamEvent::from_json(&value);
                                    return std::task::Poll::Ready(Some(Ok(event)));
                                }
                                Err(err) => {
                                    tracing::warn!(?err, "undecodable upstream frame, skipping");
                                    continue;
                                }
                            },
                            None => {
                                tracing::warn!("unparseable upstream frame payload, skipping");
                                continue;
                            }
                        }
                    }
                    std::task::Poll::Ready(Some(Err(reqwest_eventsource::Error::StreamEnded))) => {
                        return std::task::Poll::Ready(None);
                    }
                    std::task::Poll::Ready(Some(Err(err))) => {
                        return std::task::Poll::Ready(Some(Err(GatewayError::UpstreamTransport(
                            err.to_string(),
                        ))));
                    }
                    std::task::Poll::Ready(None) => return std::task::Poll::Ready(None),
                    std::task::Poll::Pending => return std::task::Poll::Pending,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hex_payload() {
        let hex = "deadbeef";
        let bytes = decode_frame_payload(hex).unwrap();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn decodes_unpadded_base64url_payload() {
        let bytes = b"hello world".to_vec();
        let encoded = data_encoding::BASE64URL_NOPAD.encode(&bytes);
        assert_eq!(decode_frame_payload(&encoded).unwrap(), bytes);
    }

    #[test]
    fn ignores_insignificant_whitespace() {
        let bytes = b"hello".to_vec();
        let encoded = data_encoding::BASE64URL_NOPAD.encode(&bytes);
        let with_whitespace = format!(" {}\n {} ", &encoded[..2], &encoded[2..]);
        assert_eq!(decode_frame_payload(&with_whitespace).unwrap(), bytes);
    }

    #[test]
    fn empty_payload_decodes_to_none() {
        assert_eq!(decode_frame_payload("   "), None);
    }

    #[test]
    fn recognizes_both_quota_phrases() {
        assert!(is_quota_exhausted_body("error: No remaining quota"));
        assert!(is_quota_exhausted_body("No AI requests remaining today"));
        assert!(!is_quota_exhausted_body("internal server error"));
    }

    #[tokio::test]
    async fn static_credential_provider_returns_configured_token() {
        let provider = StaticCredentialProvider::new("tok-123");
        assert_eq!(provider.fetch_bearer_token().await.unwrap(), "tok-123");
        assert_eq!(provider.refresh_bearer_token().await.unwrap(), "tok-123");
    }

    struct CountingFetcher {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl BearerTokenFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<String, GatewayError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(format!("tok-{n}"))
        }
    }

    #[tokio::test]
    async fn caching_provider_fetches_once_until_refreshed() {
        let provider = CachingCredentialProvider::new(CountingFetcher {
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        assert_eq!(provider.fetch_bearer_token().await.unwrap(), "tok-1");
        assert_eq!(provider.fetch_bearer_token().await.unwrap(), "tok-1");
        assert_eq!(provider.refresh_bearer_token().await.unwrap(), "tok-2");
        assert_eq!(provider.fetch_bearer_token().await.unwrap(), "tok-2");
    }
}
