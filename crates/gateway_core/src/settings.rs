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

//! Process-global configuration, read once from the environment into a
//! `Lazy<RwLock<...>>` the way `edgen_core::settings::SETTINGS` is
//! structured. Unlike edgen's settings this carries no config-file or
//! filesystem-watcher machinery: there are no model files for this gateway
//! to watch, so that part of `edgen_core::settings` was dropped (see
//! DESIGN.md).

use once_cell::sync::Lazy;
use tokio::sync::RwLock;

/// The default upstream model identifier, used when neither the caller nor
/// the packet already carries one (§4.3).
pub const DEFAULT_MODEL: &str = "claude-4.1-opus";

/// Client-identification headers the upstream requires on every request
/// (§4.4, §6). Values are configured constants, not negotiated.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// `x-client-version`-equivalent header value.
    pub client_version: String,
    /// `x-os-category`-equivalent header value.
    pub os_category: String,
    /// `x-os-version`-equivalent header value.
    pub os_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        ClientIdentity {
            client_version: "v1.0.0.gateway".to_string(),
            os_category: "Linux".to_string(),
            os_version: "unknown".to_string(),
        }
    }
}

/// Gateway-wide configuration, loaded once at process start.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// The shared secret callers must present (§6). Empty disables auth.
    pub api_key: String,
    /// The upstream base URL that C4 POSTs to.
    pub upstream_base_url: String,
    /// Client identification headers sent with every upstream request.
    pub client_identity: ClientIdentity,
    /// Connect timeout, per §5.
    pub connect_timeout_secs: u64,
    /// Read timeout, per §5 (covers long-lived streams).
    pub read_timeout_secs: u64,
    /// Write timeout, per §5.
    pub write_timeout_secs: u64,
    /// Pool-acquire timeout, per §5.
    pub pool_timeout_secs: u64,
    /// Idle keepalive expiry for pooled connections, per §5.
    pub pool_idle_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            api_key: String::new(),
            upstream_base_url: "https://app.warp.dev".to_string(),
            client_identity: ClientIdentity::default(),
            connect_timeout_secs: 10,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
            pool_timeout_secs: 10,
            pool_idle_timeout_secs: 120,
        }
    }
}

impl GatewaySettings {
    /// Build settings from the process environment (§6 "Configuration
    /// surface"). Missing variables fall back to [`GatewaySettings::default`]
    /// values; proxy-bypass variables (`NO_PROXY` etc.) are read directly by
    /// the HTTP client collaborator and not duplicated here.
    pub fn from_env() -> Self {
        let defaults = GatewaySettings::default();
        GatewaySettings {
            api_key: std::env::var("API_KEY").unwrap_or(defaults.api_key),
            upstream_base_url: std::env::var("UPSTREAM_BASE_URL")
                .unwrap_or(defaults.upstream_base_url),
            ..defaults
        }
    }

    /// `true` when auth is configured at all.
    pub fn auth_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// The process-global settings cell, initialized lazily from the
/// environment on first access, mirroring `edgen_core::settings::SETTINGS`.
pub static SETTINGS: Lazy<RwLock<GatewaySettings>> =
    Lazy::new(|| RwLock::new(GatewaySettings::from_env()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_disable_auth() {
        let settings = GatewaySettings::default();
        assert!(!settings.auth_enabled());
    }

    #[test]
    fn auth_enabled_when_api_key_set() {
        let mut settings = GatewaySettings::default();
        settings.api_key = "secret".to_string();
        assert!(settings.auth_enabled());
    }

    #[test]
    fn auth_disabled_for_whitespace_only_key() {
        let mut settings = GatewaySettings::default();
        settings.api_key = "   ".to_string();
        assert!(!settings.auth_enabled());
    }

    #[tokio::test]
    async fn settings_cell_is_readable() {
        let guard = SETTINGS.read().await;
        assert!(!guard.upstream_base_url.is_empty());
    }
}
