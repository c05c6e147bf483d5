//! The `ThirdParty` and `CloudProvider` transports (§4.9): construct
//! `{PROXY_URL}?target={dstUrl}` and forward the original request verbatim,
//! without header filtering — downstream is expected to filter.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use thiserror::Error;

use crate::body::Body;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no proxy URL is configured for this strategy")]
    NotConfigured,
    #[error("destination does not support WebSocket via this strategy")]
    WebSocketNotSupported,
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

pub async fn connect(
    request: &mut Request,
    dst_url: &url::Url,
    proxy_url: &Option<String>,
) -> Result<Response, Error> {
    if matches!(dst_url.scheme(), "ws" | "wss") {
        return Err(Error::WebSocketNotSupported);
    }
    let proxy_url = proxy_url.as_ref().ok_or(Error::NotConfigured)?;

    let mut target = url::Url::parse(proxy_url).map_err(|_| Error::NotConfigured)?;
    target.query_pairs_mut().append_pair("target", dst_url.as_str());

    // `redirect: manual` per §4.9 — the caller, not this transport, decides
    // whether to follow a redirect from the downstream proxy.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default();
    let body = match std::mem::replace(&mut request.body, Body::empty()) {
        Body::Buffered(bytes) => reqwest::Body::from(bytes),
        Body::Streaming(stream) => reqwest::Body::wrap_stream(stream),
    };

    // Header sanitization is deliberately bypassed here: this strategy
    // delegates to an operator-controlled downstream proxy which is
    // expected to do its own filtering (§9 Design Notes open question).
    let upstream_response = client
        .request(request.method.clone(), target)
        .headers(request.headers.clone())
        .body(body)
        .send()
        .await?;

    let status = upstream_response.status().as_u16();
    let response_headers = upstream_response.headers().clone();
    let response_body = upstream_response.bytes().await?;

    Ok(Response::Http {
        status,
        headers: response_headers,
        body: Body::Buffered(response_body),
    })
}
