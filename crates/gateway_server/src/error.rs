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

//! HTTP-facing wrapper around [`gateway_core::GatewayError`]: maps each
//! error kind onto the status code spec.md §7 prescribes and the
//! `{detail: ...}` body shape §6 describes, the way
//! `edgen_server::openai_shim::ChatCompletionError` implements
//! `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::GatewayError;
use serde::Serialize;
use utoipa::ToSchema;

/// The `{detail: ...}` error body every non-2xx response carries (§6).
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// A human-readable description of what went wrong.
    pub detail: String,
}

/// Newtype so `gateway_core::GatewayError` (which has no axum dependency)
/// can still be returned directly from handlers via `?`.
pub struct HttpError(pub GatewayError);

impl From<GatewayError> for HttpError {
    fn from(err: GatewayError) -> Self {
        HttpError(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::CallerError(_) => StatusCode::BAD_REQUEST,
            GatewayError::AuthError => StatusCode::UNAUTHORIZED,
            GatewayError::UpstreamQuota(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamHTTP { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = self.0.to_string();
        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_error_maps_to_400() {
        let err = HttpError(GatewayError::CallerError("empty messages".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_error_maps_to_401() {
        let err = HttpError(GatewayError::AuthError);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upstream_errors_map_to_502() {
        for err in [
            GatewayError::UpstreamQuota("no quota".to_string()),
            GatewayError::UpstreamTransport("timeout".to_string()),
            GatewayError::UpstreamHTTP {
                status: 503,
                body: "down".to_string(),
            },
        ] {
            let response = HttpError(err).into_response();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn internal_error_maps_to_500() {
        let err = HttpError(GatewayError::InternalError("boom".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
