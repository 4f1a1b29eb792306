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

//! End-to-end route tests over an in-memory router, grounded on
//! `edgen_server/tests/modelmanager_tests.rs`'s "spin up the server, drive it
//! with a client" shape but using `axum-test`'s in-process `TestServer`
//! instead of a real bound socket and a real upstream.

use std::sync::Arc;

use axum_test::TestServer;
use gateway_core::codec::JsonPassthroughRegistry;
use gateway_core::settings::GatewaySettings;
use gateway_core::upstream::{StaticCredentialProvider, UpstreamStreamer};
use gateway_server::{routes, AppState};
use serde_json::json;

// `/v1/chat/completions` is intentionally not exercised here: it drives a
// real `UpstreamStreamer::open` call, and there is no upstream to dial in an
// in-process test. Its auth and validation logic is covered directly in
// `openai_shim`'s unit tests instead.

fn test_server() -> TestServer {
    let streamer = UpstreamStreamer::new(
        &GatewaySettings::default(),
        Arc::new(JsonPassthroughRegistry),
        Arc::new(StaticCredentialProvider::new("test-token")),
    )
    .expect("streamer builds");
    let state = AppState {
        streamer: Arc::new(streamer),
    };
    TestServer::new(routes::routes(state)).expect("test server builds")
}

#[tokio::test]
async fn root_and_healthz_report_ok() {
    let server = test_server();

    let root = server.get("/").await;
    root.assert_status_ok();
    root.assert_text("ok");

    let healthz = server.get("/healthz").await;
    healthz.assert_status_ok();
    healthz.assert_text("ok");
}

#[tokio::test]
async fn version_reports_crate_version() {
    let server = test_server();
    let response = server.get("/v1/misc/version").await;
    response.assert_status_ok();
    response.assert_text(env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn list_models_echoes_default_model() {
    let server = test_server();
    let response = server.get("/v1/models").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"][0]["id"], gateway_core::settings::DEFAULT_MODEL);
}

#[tokio::test]
async fn embeddings_returns_a_32_dimensional_vector() {
    let server = test_server();
    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hello world"}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"][0]["embedding"].as_array().unwrap().len(), 32);
}
