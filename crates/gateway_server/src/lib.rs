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

//! The ambient stack around `gateway_core`'s pipeline: the axum HTTP
//! surface, the CLI/launcher, and process wiring. Grounded on
//! `edgen_server::lib`.

#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod misc;
pub mod openai_shim;
pub mod routes;

use std::sync::Arc;

use gateway_core::codec::{JsonPassthroughRegistry, SchemaRegistry};
use gateway_core::upstream::{BearerTokenFetcher, CachingCredentialProvider, CredentialProvider, UpstreamStreamer};
use gateway_core::GatewayError;
use utoipa::OpenApi;

use cli::Command;

/// The OpenAPI surface this gateway exposes, grounded on
/// `edgen_server::ApiDoc`.
#[derive(OpenApi)]
#[openapi(
    info(title = "Warp Gateway API", description = "An OpenAI-compatible facade over a multi-agent upstream."),
    paths(
        misc::root,
        misc::healthz,
        misc::version,
        openai_shim::chat_completions,
        openai_shim::list_models,
        openai_shim::create_embeddings,
    ),
    components(schemas(
        openai_shim::ModelList,
        openai_shim::ModelListEntry,
        openai_shim::CreateEmbeddingsRequest,
        openai_shim::EmbeddingResponse,
        openai_shim::EmbeddingEntry,
        error::ErrorBody,
    ))
)]
struct ApiDoc;

/// Shared, cloneable handle every handler receives via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    /// C4, already wired to a schema registry and credential provider.
    pub streamer: Arc<UpstreamStreamer>,
}

struct EnvBearerTokenFetcher;

#[async_trait::async_trait]
impl BearerTokenFetcher for EnvBearerTokenFetcher {
    async fn fetch(&self) -> Result<String, GatewayError> {
        Ok(std::env::var("UPSTREAM_BEARER_TOKEN").unwrap_or_default())
    }
}

/// Dispatch the parsed CLI command (§1: CLI/launcher is an external
/// collaborator, wired here the way `edgen_server::lib::start` does it).
pub fn start() -> Result<(), GatewayError> {
    match &cli::PARSED_COMMANDS.command {
        Command::Serve(args) => start_server(args.uri.clone()),
        Command::Version(_) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Oasgen(args) => {
            let doc = ApiDoc::openapi();
            if args.json {
                println!("{}", doc.to_pretty_json().map_err(|e| GatewayError::InternalError(e.to_string()))?);
            } else {
                println!("{}", doc.to_yaml().map_err(|e| GatewayError::InternalError(e.to_string()))?);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn start_server(uri: String) -> Result<(), GatewayError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = gateway_core::settings::GatewaySettings::from_env();
    let registry: Arc<dyn SchemaRegistry> = Arc::new(JsonPassthroughRegistry);
    let credentials: Arc<dyn CredentialProvider> = Arc::new(CachingCredentialProvider::new(EnvBearerTokenFetcher));
    let streamer = Arc::new(UpstreamStreamer::new(&settings, registry, credentials)?);

    let state = AppState { streamer };
    let router = routes::routes(state).layer(tower_http::cors::CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&uri)
        .await
        .map_err(|e| GatewayError::InternalError(e.to_string()))?;
    tracing::info!(%uri, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::InternalError(e.to_string()))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
