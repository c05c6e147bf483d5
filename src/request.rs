//! The inbound request fingerprint (§3 Data Model).
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use http::{HeaderMap, Method};

use crate::body::Body;

/// Method, destination, inbound headers, and a body handle — ephemeral,
/// created per inbound call and destroyed with it.
pub struct Request {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    /// A request identical to this one but with an independent body handle,
    /// used before a fallback-eligible transport attempt (§4.1 step 4). Only
    /// possible when the body is `Buffered`.
    #[must_use]
    pub fn clone_for_fallback(&self) -> Option<Self> {
        Some(Self {
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone_for_fallback()?,
        })
    }
}

/// Which DNS wire transport the URL path named (§6 grammar
/// `/{token}/dns/{doh|dot}[/{server}]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsVariant {
    Doh,
    Dot,
}

impl DnsVariant {
    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "doh" => Some(Self::Doh),
            "dot" => Some(Self::Dot),
            _ => None,
        }
    }
}
