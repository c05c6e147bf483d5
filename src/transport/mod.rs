//! The seven pluggable transport strategies (§3, §4.3, §4.8, §4.9) behind a
//! single closed `Transport` enum, matched rather than dispatched through a
//! trait object — see the Design Notes rationale in §9.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

pub mod doh;
pub mod dot;
pub mod fetch;
pub mod socket;
pub mod socks5;
pub mod thirdparty;

use crate::config::Config;
use crate::error::{StatusClass, StatusError};
use crate::request::Request;
use crate::response::Response;

/// The seven strategies selectable via `PROXY_STRATEGY`/`FALLBACK_PROXY_STRATEGY`
/// (§6). Also used as the DNS-capable transports' selector when the URL
/// path names `doh`/`dot` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Socket,
    Fetch,
    Socks5,
    ThirdParty,
    CloudProvider,
    Doh,
    Dot,
}

impl Strategy {
    /// Parse a `PROXY_STRATEGY`-style string, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "socket" => Some(Self::Socket),
            "fetch" => Some(Self::Fetch),
            "socks5" => Some(Self::Socks5),
            "thirdparty" => Some(Self::ThirdParty),
            "cloudprovider" => Some(Self::CloudProvider),
            "doh" => Some(Self::Doh),
            "dot" => Some(Self::Dot),
            _ => None,
        }
    }
}

/// A concrete transport instance, ready to `connect` or `handle_dns_query`.
/// Instantiated fresh per inbound call (§9: "no global state").
#[derive(Debug, Clone, Copy)]
pub enum Transport {
    Socket,
    Fetch,
    Socks5,
    ThirdParty,
    CloudProvider,
    Doh,
    Dot,
}

impl Transport {
    #[must_use]
    pub const fn from_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Socket => Self::Socket,
            Strategy::Fetch => Self::Fetch,
            Strategy::Socks5 => Self::Socks5,
            Strategy::ThirdParty => Self::ThirdParty,
            Strategy::CloudProvider => Self::CloudProvider,
            Strategy::Doh => Self::Doh,
            Strategy::Dot => Self::Dot,
        }
    }

    /// Whether this transport's failures are eligible for the §4.1 step 4
    /// fallback clone. Only `Socket` is, per the spec's explicit scope.
    #[must_use]
    pub const fn may_fall_back(self) -> bool {
        matches!(self, Self::Socket)
    }

    /// Forward `request` to `dst_url` (§3's transport capability `connect`).
    /// Takes the request mutably: a `Streaming` body is drained as it is
    /// forwarded, since it is readable exactly once.
    #[tracing::instrument(skip(self, request, config), fields(transport = ?self))]
    pub async fn connect(
        self,
        request: &mut Request,
        dst_url: &url::Url,
        config: &Config,
    ) -> Result<Response, StatusError> {
        match self {
            Self::Socket => socket::connect(request, dst_url, config)
                .await
                .map_err(status_from_socket_error),
            Self::Fetch => fetch::connect(request, dst_url, config)
                .await
                .map_err(status_from_fetch_error),
            Self::Socks5 => socks5::connect(request, dst_url, config)
                .await
                .map_err(status_from_socks5_error),
            Self::ThirdParty => thirdparty::connect(request, dst_url, &config.third_party_proxy_url)
                .await
                .map_err(status_from_thirdparty_error),
            Self::CloudProvider => thirdparty::connect(request, dst_url, &config.cloud_provider_url)
                .await
                .map_err(status_from_thirdparty_error),
            Self::Doh | Self::Dot => Err(StatusError::unsupported(
                "DNS transports do not implement the generic connect capability",
            )),
        }
    }

    /// Handle a DNS-over-HTTPS/TLS query (§3's transport capability
    /// `handleDnsQuery`). Transports without DNS support return `501`; the
    /// controller is expected to have already overridden the transport to
    /// `Doh`/`Dot` per §4.1 step 1 whenever the URL names a DNS path, so
    /// this fallback mostly guards against a future caller skipping that
    /// override.
    #[tracing::instrument(skip(self, request, config), fields(transport = ?self))]
    pub async fn handle_dns_query(
        self,
        request: &mut Request,
        config: &Config,
    ) -> Result<Response, StatusError> {
        match self {
            Self::Doh => doh::handle(request, config).await.map_err(status_from_doh_error),
            Self::Dot => dot::handle(request, config).await.map_err(status_from_dot_error),
            Self::Socket | Self::Fetch | Self::Socks5 | Self::ThirdParty | Self::CloudProvider => {
                Err(StatusError::unsupported(
                    "this transport does not implement DNS query handling",
                ))
            }
        }
    }
}

/// §7: `destination scheme … is not a WebSocket scheme` is a malformed
/// request (ClientError); everything else from the `Socket` transport is an
/// upstream failure.
fn status_from_socket_error(err: socket::Error) -> StatusError {
    let class = match &err {
        socket::Error::NotAWebSocketScheme(_) => StatusClass::ClientError,
        _ => StatusClass::UpstreamFailure,
    };
    StatusError::new(class, err.to_string())
}

/// §7: a non-WS target on the WS path and a misconfigured SOCKS5 address
/// are both malformed requests; SOCKS5 rejections and socket I/O errors
/// stay upstream failures.
fn status_from_socks5_error(err: socks5::Error) -> StatusError {
    let class = match &err {
        socks5::Error::NotConfigured
        | socks5::Error::InvalidAddress(_)
        | socks5::Error::NotAWebSocketScheme(_) => StatusClass::ClientError,
        _ => StatusClass::UpstreamFailure,
    };
    StatusError::new(class, err.to_string())
}

/// §4.9: 400 for a WebSocket destination, since `Fetch` only forwards HTTP.
fn status_from_fetch_error(err: fetch::Error) -> StatusError {
    let class = match &err {
        fetch::Error::WebSocketNotSupported => StatusClass::ClientError,
        fetch::Error::Reqwest(_) => StatusClass::UpstreamFailure,
    };
    StatusError::new(class, err.to_string())
}

/// §4.9: 400 for a WebSocket destination; an unconfigured proxy URL and
/// downstream request failures stay upstream failures.
fn status_from_thirdparty_error(err: thirdparty::Error) -> StatusError {
    let class = match &err {
        thirdparty::Error::WebSocketNotSupported => StatusClass::ClientError,
        thirdparty::Error::NotConfigured | thirdparty::Error::Reqwest(_) => StatusClass::UpstreamFailure,
    };
    StatusError::new(class, err.to_string())
}

/// §4.8: a malformed DNS request is a ClientError; exhausting both the
/// primary and fallback transport is a GatewayFailure.
fn status_from_doh_error(err: doh::Error) -> StatusError {
    match err {
        doh::Error::Client(message) => StatusError::client(message),
        doh::Error::FallbackFailed(message) => StatusError::gateway(message),
    }
}

/// §4.8: same taxonomy as DoH, for DoT falling back to DoH-Fetch.
fn status_from_dot_error(err: dot::Error) -> StatusError {
    match err {
        dot::Error::Client(message) => StatusError::client(message),
        dot::Error::FallbackFailed(message) => StatusError::gateway(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_strategies_case_insensitively() {
        assert_eq!(Strategy::parse("Socket"), Some(Strategy::Socket));
        assert_eq!(Strategy::parse("SOCKS5"), Some(Strategy::Socks5));
        assert_eq!(Strategy::parse("cloudprovider"), Some(Strategy::CloudProvider));
        assert_eq!(Strategy::parse("nonsense"), None);
    }

    #[test]
    fn only_socket_may_fall_back() {
        assert!(Transport::Socket.may_fall_back());
        assert!(!Transport::Fetch.may_fall_back());
        assert!(!Transport::Socks5.may_fall_back());
    }

    #[test]
    fn non_websocket_scheme_errors_are_client_errors() {
        assert_eq!(
            status_from_socket_error(socket::Error::NotAWebSocketScheme("https".to_owned())).class,
            StatusClass::ClientError
        );
        assert_eq!(
            status_from_socks5_error(socks5::Error::NotAWebSocketScheme("https".to_owned())).class,
            StatusClass::ClientError
        );
        assert_eq!(
            status_from_fetch_error(fetch::Error::WebSocketNotSupported).class,
            StatusClass::ClientError
        );
        assert_eq!(
            status_from_thirdparty_error(thirdparty::Error::WebSocketNotSupported).class,
            StatusClass::ClientError
        );
    }

    #[test]
    fn misconfigured_socks5_address_is_a_client_error() {
        assert_eq!(
            status_from_socks5_error(socks5::Error::NotConfigured).class,
            StatusClass::ClientError
        );
        assert_eq!(
            status_from_socks5_error(socks5::Error::InvalidAddress("nope".to_owned())).class,
            StatusClass::ClientError
        );
    }

    #[test]
    fn dns_transport_double_failure_is_a_gateway_failure() {
        assert_eq!(
            status_from_doh_error(doh::Error::FallbackFailed("both failed".to_owned())).class,
            StatusClass::GatewayFailure
        );
        assert_eq!(
            status_from_dot_error(dot::Error::FallbackFailed("both failed".to_owned())).class,
            StatusClass::GatewayFailure
        );
    }

    #[test]
    fn malformed_dns_request_is_a_client_error() {
        assert_eq!(
            status_from_doh_error(doh::Error::Client("bad request".to_owned())).class,
            StatusClass::ClientError
        );
        assert_eq!(
            status_from_dot_error(dot::Error::Client("bad request".to_owned())).class,
            StatusClass::ClientError
        );
    }
}
