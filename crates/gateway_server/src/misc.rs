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

//! Liveness and version endpoints (§1, §6 supplement). Grounded on
//! `edgen_server::misc` for the version macro/handler shape and
//! `protobuf2openai/router.py::health_check`/`root` for the two trivial
//! liveness routes.

/// Returns this crate's `Cargo.toml` version at compile time, the way
/// `edgen_server::misc::cargo_crate_version!` does.
macro_rules! cargo_crate_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

/// `GET /v1/misc/version`: the running gateway's version string.
#[utoipa::path(
    get,
    path = "/v1/misc/version",
    responses((status = 200, description = "OK", body = String)),
)]
pub async fn version() -> String {
    cargo_crate_version!().to_string()
}

/// `GET /`: trivial root liveness probe.
#[utoipa::path(get, path = "/", responses((status = 200, description = "OK")))]
pub async fn root() -> &'static str {
    "ok"
}

/// `GET /healthz`: trivial liveness probe.
#[utoipa::path(get, path = "/healthz", responses((status = 200, description = "OK")))]
pub async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_is_non_empty() {
        assert!(!version().await.is_empty());
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        assert_eq!(healthz().await, "ok");
    }
}
