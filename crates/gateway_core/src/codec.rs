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

//! The codec facade (§1, §6): `encode(message_type, obj) -> bytes` and
//! `decode(message_type, bytes) -> obj` over the upstream's typed schema
//! registry. The registry itself (the binary schema definitions and their
//! validation rules) is an external collaborator outside this crate's
//! scope; `SchemaRegistry` is the seam the pipeline consumes it through.

use crate::error::GatewayError;

/// The upstream's schema-typed encode/decode boundary. Production
/// deployments back this with the real binary schema registry; this crate
/// ships only the JSON-passthrough stand-in described below, since the
/// registry's actual wire encoding is explicitly out of scope (§1).
pub trait SchemaRegistry: Send + Sync {
    /// Encode `value` as the named upstream message type.
    fn encode(&self, message_type: &str, value: &serde_json::Value) -> Result<Vec<u8>, GatewayError>;

    /// Decode bytes previously produced for the named upstream message type.
    fn decode(&self, message_type: &str, bytes: &[u8]) -> Result<serde_json::Value, GatewayError>;
}

/// A stand-in `SchemaRegistry` that serializes values as JSON bytes rather
/// than the upstream's real binary schema encoding. The real registry is an
/// external collaborator (§1); this implementation exists so the pipeline
/// is runnable and testable without it, and documents the seam a production
/// deployment replaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPassthroughRegistry;

impl SchemaRegistry for JsonPassthroughRegistry {
    fn encode(&self, _message_type: &str, value: &serde_json::Value) -> Result<Vec<u8>, GatewayError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, _message_type: &str, bytes: &[u8]) -> Result<serde_json::Value, GatewayError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passthrough_round_trips() {
        let registry = JsonPassthroughRegistry;
        let value = json!({"a": 1, "b": "two"});
        let bytes = registry.encode("warp.multi_agent.v1.Request", &value).unwrap();
        let decoded = registry.decode("warp.multi_agent.v1.Request", &bytes).unwrap();
        assert_eq!(decoded, value);
    }
}
