//! The configuration bag of §6, loaded from environment variables.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::env;
use std::time::Duration;

use crate::transport::Strategy;

/// Bound on how much of a request body the controller will buffer in
/// memory to make it replayable for a fallback attempt (§9 Design Notes).
pub const MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// The process-wide, read-only configuration bag (§3 Data Model). Built once
/// at startup and shared behind an `Arc`; never mutated or re-read per call.
#[derive(Debug, Clone)]
pub struct Config {
    pub auth_token: String,
    pub default_dst_url: String,
    pub debug_mode: bool,
    pub proxy_strategy: Strategy,
    pub fallback_proxy_strategy: Strategy,
    pub socks5_address: Option<String>,
    pub third_party_proxy_url: Option<String>,
    pub cloud_provider_url: Option<String>,
    pub doh_server_hostname: String,
    pub doh_server_port: u16,
    pub doh_server_path: String,
    pub dot_server_hostname: String,
    pub dot_server_port: u16,
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            default_dst_url: "https://example.com".to_owned(),
            debug_mode: false,
            proxy_strategy: Strategy::Socket,
            fallback_proxy_strategy: Strategy::Fetch,
            socks5_address: None,
            third_party_proxy_url: None,
            cloud_provider_url: None,
            doh_server_hostname: "dns.google".to_owned(),
            doh_server_port: 443,
            doh_server_path: "/dns-query".to_owned(),
            dot_server_hostname: "dns.google".to_owned(),
            dot_server_port: 853,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load the configuration bag from the process environment, falling
    /// back to the defaults documented in §6 for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auth_token: env_string("AUTH_TOKEN").unwrap_or(defaults.auth_token),
            default_dst_url: env_string("DEFAULT_DST_URL").unwrap_or(defaults.default_dst_url),
            debug_mode: env_bool("DEBUG_MODE").unwrap_or(defaults.debug_mode),
            proxy_strategy: env_string("PROXY_STRATEGY")
                .and_then(|s| Strategy::parse(&s))
                .unwrap_or(defaults.proxy_strategy),
            fallback_proxy_strategy: env_string("FALLBACK_PROXY_STRATEGY")
                .and_then(|s| Strategy::parse(&s))
                .unwrap_or(defaults.fallback_proxy_strategy),
            socks5_address: env_string("SOCKS5_ADDRESS"),
            third_party_proxy_url: env_string("THIRD_PARTY_PROXY_URL"),
            cloud_provider_url: env_string("CLOUD_PROVIDER_URL"),
            doh_server_hostname: env_string("DOH_SERVER_HOSTNAME")
                .unwrap_or(defaults.doh_server_hostname),
            doh_server_port: env_u16("DOH_SERVER_PORT").unwrap_or(defaults.doh_server_port),
            doh_server_path: env_string("DOH_SERVER_PATH").unwrap_or(defaults.doh_server_path),
            dot_server_hostname: env_string("DOT_SERVER_HOSTNAME")
                .unwrap_or(defaults.dot_server_hostname),
            dot_server_port: env_u16("DOT_SERVER_PORT").unwrap_or(defaults.dot_server_port),
            connect_timeout: env_u64("CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_u16(key: &str) -> Option<u16> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Ambient (host-binary-only) listening configuration; not part of the
/// core's §6 bag, but loaded the same way.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub listen_host: String,
    pub listen_port: u16,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_owned(),
            listen_port: 8080,
        }
    }
}

impl HostConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_host: env_string("LISTEN_HOST").unwrap_or(defaults.listen_host),
            listen_port: env_u16("LISTEN_PORT").unwrap_or(defaults.listen_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.doh_server_hostname, "dns.google");
        assert_eq!(config.doh_server_port, 443);
        assert_eq!(config.doh_server_path, "/dns-query");
        assert_eq!(config.dot_server_hostname, "dns.google");
        assert_eq!(config.dot_server_port, 853);
        assert_eq!(config.proxy_strategy, Strategy::Socket);
        assert_eq!(config.fallback_proxy_strategy, Strategy::Fetch);
    }
}
