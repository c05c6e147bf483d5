//! URL path grammar (§6): recovers either a DNS request or a destination
//! URL from the inbound path and query string.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::request::DnsVariant;

/// What the path named, once the token has been checked.
pub enum Destination {
    Dns(DnsVariant),
    Proxy(url::Url),
}

/// §4.1 steps 1-2 and §6's grammar. `path` is the raw request-target path
/// (no query string); `query` is the raw query string, if any, unchanged.
#[must_use]
pub fn route(path: &str, query: Option<&str>, auth_token: &str, default_dst_url: &str) -> Destination {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.first() != Some(&auth_token) || auth_token.is_empty() {
        return Destination::Proxy(fallback_url(default_dst_url));
    }

    match segments.get(1) {
        Some(&"dns") => match segments.get(2).and_then(|v| DnsVariant::parse(v)) {
            Some(variant) => Destination::Dns(variant),
            // An unrecognized `/dns/...` shape still falls through to the
            // default destination, matching the token-mismatch behavior.
            None => Destination::Proxy(fallback_url(default_dst_url)),
        },
        Some(scheme_segment) => {
            let scheme = scheme_segment.trim_end_matches(':');
            let Some(host) = segments.get(2) else {
                return Destination::Proxy(fallback_url(default_dst_url));
            };
            let rest = segments.get(3..).unwrap_or(&[]).join("/");
            let mut built = format!("{scheme}://{host}");
            if !rest.is_empty() {
                built.push('/');
                built.push_str(&rest);
            }
            if let Some(query) = query {
                built.push('?');
                built.push_str(query);
            }
            match url::Url::parse(&built) {
                Ok(url) => Destination::Proxy(url),
                Err(_) => Destination::Proxy(fallback_url(default_dst_url)),
            }
        }
        None => Destination::Proxy(fallback_url(default_dst_url)),
    }
}

fn fallback_url(default_dst_url: &str) -> url::Url {
    url::Url::parse(default_dst_url)
        .unwrap_or_else(|_| url::Url::parse("https://example.com").expect("static URL is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_to_dns_transport() {
        let dest = route("/TOK/dns/doh", None, "TOK", "https://example.com");
        assert!(matches!(dest, Destination::Dns(DnsVariant::Doh)));
    }

    #[test]
    fn routes_to_proxy_destination_with_query() {
        let dest = route("/TOK/https/httpbin.org/get", Some("a=1"), "TOK", "https://example.com");
        match dest {
            Destination::Proxy(url) => assert_eq!(url.as_str(), "https://httpbin.org/get?a=1"),
            Destination::Dns(_) => panic!("expected a proxy destination"),
        }
    }

    #[test]
    fn accepts_scheme_with_trailing_colon() {
        let dest = route("/TOK/https:/httpbin.org/get", None, "TOK", "https://example.com");
        match dest {
            Destination::Proxy(url) => assert_eq!(url.as_str(), "https://httpbin.org/get"),
            Destination::Dns(_) => panic!("expected a proxy destination"),
        }
    }

    #[test]
    fn token_mismatch_falls_back_to_default() {
        let dest = route("/WRONG/https/httpbin.org/get", None, "TOK", "https://example.com/default");
        match dest {
            Destination::Proxy(url) => assert_eq!(url.as_str(), "https://example.com/default"),
            Destination::Dns(_) => panic!("expected a proxy destination"),
        }
    }

    #[test]
    fn empty_path_falls_back_to_default() {
        let dest = route("/", None, "TOK", "https://example.com/default");
        match dest {
            Destination::Proxy(url) => assert_eq!(url.as_str(), "https://example.com/default"),
            Destination::Dns(_) => panic!("expected a proxy destination"),
        }
    }

    #[test]
    fn dns_path_ignores_optional_server_segment() {
        let dest = route("/TOK/dns/dot/1.1.1.1", None, "TOK", "https://example.com");
        assert!(matches!(dest, Destination::Dns(DnsVariant::Dot)));
    }
}
