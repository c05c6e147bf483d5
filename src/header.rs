//! Header sanitizer (§4.2): strips hop-by-hop and environment-leaking
//! headers before a request is forwarded upstream.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use http::{HeaderMap, HeaderName};

/// A header is dropped if its lower-cased name matches this pattern.
/// Kept as a small match rather than a compiled `regex` since the whole
/// crate has no other use for a regex engine and the pattern is this
/// simple and fixed.
fn is_denied(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("host")
        || name.starts_with("accept-encoding")
        || name.starts_with("referer")
        || name.starts_with("referrer")
        || name.starts_with("cf-")
        || name.starts_with("cdn-")
}

/// Copy `headers` into a new `HeaderMap`, dropping anything matching the
/// deny pattern of §3's invariant. Callers then add `Host` and any
/// transport-specific headers themselves.
#[must_use]
pub fn sanitize(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_denied(name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Insert or replace a header, panicking only on a truly static, known-good
/// name - used for the small set of header names this crate hard-codes.
pub fn set(headers: &mut HeaderMap, name: &'static str, value: impl Into<Vec<u8>>) {
    let name = HeaderName::from_static(name);
    let value = http::HeaderValue::from_bytes(&value.into()).expect("invalid header value");
    headers.insert(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn strips_denied_headers_case_insensitively() {
        let mut input = HeaderMap::new();
        input.insert("Host", HeaderValue::from_static("evil.example"));
        input.insert("Accept-Encoding", HeaderValue::from_static("gzip"));
        input.insert("CF-Connecting-IP", HeaderValue::from_static("1.2.3.4"));
        input.insert("CDN-Loop", HeaderValue::from_static("cloudflare"));
        input.insert("Referer", HeaderValue::from_static("https://x.example"));
        input.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
        input.insert("X-Custom", HeaderValue::from_static("kept"));

        let out = sanitize(&input);

        assert!(out.get("host").is_none());
        assert!(out.get("accept-encoding").is_none());
        assert!(out.get("cf-connecting-ip").is_none());
        assert!(out.get("cdn-loop").is_none());
        assert!(out.get("referer").is_none());
        assert!(out.get("referrer-policy").is_none());
        assert_eq!(out.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn preserves_unrelated_headers() {
        let mut input = HeaderMap::new();
        input.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        input.insert("Content-Type", HeaderValue::from_static("application/json"));
        let out = sanitize(&input);
        assert_eq!(out.len(), 2);
    }
}
