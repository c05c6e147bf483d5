//! The `Fetch` transport (§4.9): delegates to the runtime's high-level HTTP
//! client. No WebSocket support.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use thiserror::Error;

use crate::body::Body;
use crate::config::Config;
use crate::header;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Error)]
pub enum Error {
    #[error("fetch does not support WebSocket destinations")]
    WebSocketNotSupported,
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

pub async fn connect(request: &mut Request, dst_url: &url::Url, config: &Config) -> Result<Response, Error> {
    if matches!(dst_url.scheme(), "ws" | "wss") {
        return Err(Error::WebSocketNotSupported);
    }

    let client = client(config);
    let mut headers = header::sanitize(&request.headers);
    header::set(&mut headers, "host", dst_url.host_str().unwrap_or_default());

    let body = match std::mem::replace(&mut request.body, Body::empty()) {
        Body::Buffered(bytes) => reqwest::Body::from(bytes),
        Body::Streaming(stream) => reqwest::Body::wrap_stream(stream),
    };

    let upstream_response = client
        .request(request.method.clone(), dst_url.as_str())
        .headers(headers)
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

fn client(config: &Config) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default()
}
