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

//! Router assembly, grounded on `edgen_server::routes`.

use axum::routing::{get, post};
use axum::Router;

use crate::{misc, openai_shim, AppState};

/// Build the full router for this gateway.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(misc::root))
        .route("/healthz", get(misc::healthz))
        .route("/v1/misc/version", get(misc::version))
        .route("/v1/chat/completions", post(openai_shim::chat_completions))
        .route("/v1/models", get(openai_shim::list_models))
        .route("/v1/embeddings", post(openai_shim::create_embeddings))
        .with_state(state)
}
