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

//! The error kinds the pipeline can produce, and how they map onto the
//! seven categories in the error handling design.

use std::fmt;

/// Every error the pipeline can surface, grouped by how a caller (or the
/// HTTP layer above us) should react to it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed inbound body or an empty `messages` list.
    #[error("bad request: {0}")]
    CallerError(String),

    /// Missing or mismatched shared secret.
    #[error("unauthorized")]
    AuthError,

    /// A recognized quota-exhaustion 429 that survived the one-shot refresh
    /// and retry. The upstream body is preserved for the caller.
    #[error("upstream quota exhausted: {0}")]
    UpstreamQuota(String),

    /// An undecodable frame or unrecognized event tag. Per the propagation
    /// policy this variant is logged and skipped by C4/C5; it is only
    /// constructed so parsing code has something to return to its caller
    /// before that caller decides to skip it.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    /// Connect/timeout failure that exhausted its retry budget.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// Any other non-200 response from the upstream.
    #[error("upstream http error ({status}): {body}")]
    UpstreamHTTP {
        /// The HTTP status code the upstream returned.
        status: u16,
        /// The upstream response body, preserved verbatim.
        body: String,
    },

    /// Anything unexpected. Maps to HTTP 500, and to a terminal error chunk
    /// if raised after the stream already opened.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl GatewayError {
    /// The message placed in the terminal error chunk's `error.message`
    /// field (§4.5 TERMINATED_ERROR) when this error occurs mid-stream.
    pub fn terminal_message(&self) -> String {
        self.to_string()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            GatewayError::UpstreamTransport(err.to_string())
        } else {
            GatewayError::InternalError(err.to_string())
        }
    }
}

impl From<reqwest_eventsource::Error> for GatewayError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        GatewayError::UpstreamTransport(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InternalError(err.to_string())
    }
}

/// Thin display wrapper used where a caller-facing `{detail: ...}` string is
/// wanted without pulling the HTTP layer into `gateway_core`.
pub struct Detail<'a>(pub &'a GatewayError);

impl fmt::Display for Detail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_error_message_is_preserved() {
        let err = GatewayError::CallerError("messages must not be empty".to_string());
        assert_eq!(err.to_string(), "bad request: messages must not be empty");
    }

    #[test]
    fn upstream_http_preserves_status_and_body() {
        let err = GatewayError::UpstreamHTTP {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("maintenance"));
    }

    #[test]
    fn terminal_message_matches_display() {
        let err = GatewayError::InternalError("boom".to_string());
        assert_eq!(err.terminal_message(), err.to_string());
    }
}
