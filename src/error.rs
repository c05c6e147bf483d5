//! The HTTP-status mapping of §7.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
use thiserror::Error;

/// The four HTTP status taxa of §7, with the classification needed to
/// decide whether the dispatch controller should retry through a fallback
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Malformed request: non-POST/wrong content-type on DNS, non-WS target
    /// on the WebSocket path, a misconfigured SOCKS address, and so on.
    ClientError,
    /// A transport-agnostic default handler was invoked for a capability it
    /// does not implement (e.g. DNS on a non-DNS-capable transport).
    Unsupported,
    /// Header parse errors, handshake failures, SOCKS5 rejections, socket
    /// I/O errors: fatal for this attempt, with a human-readable message.
    UpstreamFailure,
    /// DNS fallback exhausted both the primary and the fallback transport.
    GatewayFailure,
}

impl StatusClass {
    /// The HTTP status code this class is rendered as.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::ClientError => 400,
            Self::Unsupported => 501,
            Self::UpstreamFailure => 500,
            Self::GatewayFailure => 502,
        }
    }
}

/// An error already classified and ready to be rendered as an HTTP response.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StatusError {
    pub class: StatusClass,
    pub message: String,
}

impl StatusError {
    #[must_use]
    pub fn new(class: StatusClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(StatusClass::ClientError, message)
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(StatusClass::Unsupported, message)
    }

    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusClass::UpstreamFailure, message)
    }

    #[must_use]
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::new(StatusClass::GatewayFailure, message)
    }

    /// §4.7: is this error message one of the restricted-network substrings
    /// that should trigger a fallback transport rather than surfacing to the
    /// client?
    #[must_use]
    pub fn is_network_restricted(&self) -> bool {
        is_network_restricted_message(&self.message)
    }
}

/// The substrings from §4.7 that mark an error as an egress restriction of
/// the host platform rather than a fault of the destination.
const RESTRICTED_NETWORK_SUBSTRINGS: &[&str] = &[
    "A network issue was detected",
    "Network connection failure",
    "connection failed",
    "timed out",
    "Stream was cancelled",
    "proxy request failed",
    "cannot connect to the specified address",
    "TCP Loop detected",
    "Connections to port 25 are prohibited",
];

/// §4.7: classify a raw error message.
#[must_use]
pub fn is_network_restricted_message(message: &str) -> bool {
    RESTRICTED_NETWORK_SUBSTRINGS
        .iter()
        .any(|needle| message.contains(needle))
}

// There is deliberately no blanket conversion from a leaf module's `Error`
// enum to `StatusError`: the same underlying error (say, a connect timeout)
// is a `500` from most transports but should only ever reach
// `StatusClass::GatewayFailure` from the DNS transports' exhausted-fallback
// path. Callers classify each leaf variant explicitly at the boundary (see
// `transport::mod`'s `status_from_*_error` functions) so the class is
// always a decision made at the call site, not inferred.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_restricted_network_substrings() {
        assert!(is_network_restricted_message("TCP Loop detected"));
        assert!(is_network_restricted_message("upstream timed out waiting"));
        assert!(!is_network_restricted_message("Invalid status line"));
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(StatusClass::ClientError.status_code(), 400);
        assert_eq!(StatusClass::Unsupported.status_code(), 501);
        assert_eq!(StatusClass::UpstreamFailure.status_code(), 500);
        assert_eq!(StatusClass::GatewayFailure.status_code(), 502);
    }
}
