//! The `Socket` transport (§4.3): forwards over a raw TCP or TLS-wrapped
//! TCP socket, using the hand-rolled HTTP/1.1 and WebSocket client codecs.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use http::Method;
use thiserror::Error;
use tokio::io::{split, AsyncWriteExt};

use crate::body::Body;
use crate::bytestream::ByteStream;
use crate::codec::{http1, websocket};
use crate::config::Config;
use crate::header;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Error)]
pub enum Error {
    #[error("destination scheme {0:?} is not a WebSocket scheme")]
    NotAWebSocketScheme(String),
    #[error("WebSocket handshake did not return 101 Switching Protocols")]
    HandshakeRejected,
    #[error("connect to {host}:{port} timed out")]
    ConnectTimedOut { host: String, port: u16 },
    #[error(transparent)]
    Http1(#[from] http1::Error),
    #[error(transparent)]
    WebSocket(#[from] websocket::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "https" | "wss" => 443,
        _ => 80,
    }
}

fn is_tls_scheme(scheme: &str) -> bool {
    matches!(scheme, "https" | "wss")
}

async fn open_socket(dst_url: &url::Url, config: &Config) -> Result<ByteStream, Error> {
    let host = dst_url
        .host_str()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing host"))?
        .to_owned();
    let port = dst_url.port().unwrap_or_else(|| default_port(dst_url.scheme()));
    let use_tls = is_tls_scheme(dst_url.scheme());
    match tokio::time::timeout(config.connect_timeout, ByteStream::connect(&host, port, use_tls)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(io_err)) => Err(Error::from(io_err)),
        Err(_elapsed) => Err(Error::ConnectTimedOut { host, port }),
    }
}

/// §4.3 HTTP path.
pub async fn connect(request: &mut Request, dst_url: &url::Url, config: &Config) -> Result<Response, Error> {
    if matches!(dst_url.scheme(), "ws" | "wss") {
        return connect_websocket(request, dst_url, config).await;
    }

    let mut stream = open_socket(dst_url, config).await?;

    let mut headers = header::sanitize(&request.headers);
    header::set(&mut headers, "host", dst_url.host_str().unwrap_or_default());
    header::set(&mut headers, "accept-encoding", "identity");

    let path_and_query = path_and_query(dst_url);
    http1::write_request_head(&mut stream, &request.method, &path_and_query, &headers).await?;
    request.body.write_to(&mut stream).await?;
    stream.flush().await?;

    let (read_half, _write_half) = split(stream);
    let mut reader = tokio::io::BufReader::new(read_half);
    let head = http1::read_response_head(&mut reader).await?;
    let body = http1::read_body(reader, &head);

    Ok(Response::Http {
        status: head.status,
        headers: head.headers,
        body: Body::Streaming(crate::body::BodyStream::new(body)),
    })
}

fn path_and_query(dst_url: &url::Url) -> String {
    match dst_url.query() {
        Some(query) => format!("{}?{}", dst_url.path(), query),
        None => dst_url.path().to_owned(),
    }
}

/// §4.3 WebSocket path.
async fn connect_websocket(
    request: &mut Request,
    dst_url: &url::Url,
    config: &Config,
) -> Result<Response, Error> {
    if !matches!(dst_url.scheme(), "ws" | "wss") {
        return Err(Error::NotAWebSocketScheme(dst_url.scheme().to_owned()));
    }

    let mut stream = open_socket(dst_url, config).await?;

    let key = websocket::generate_key();
    let mut headers = header::sanitize(&request.headers);
    header::set(&mut headers, "host", dst_url.host_str().unwrap_or_default());
    header::set(&mut headers, "connection", "Upgrade");
    header::set(&mut headers, "upgrade", "websocket");
    header::set(&mut headers, "sec-websocket-version", "13");
    header::set(&mut headers, "sec-websocket-key", key.as_str());

    let path_and_query = path_and_query(dst_url);
    http1::write_request_head(&mut stream, &Method::GET, &path_and_query, &headers).await?;
    stream.flush().await?;

    let status_line = websocket::read_handshake_response(&mut stream).await?;
    if !websocket::is_successful_handshake(&status_line) {
        return Err(Error::HandshakeRejected);
    }

    Ok(Response::WebSocketUpgrade { upstream: stream })
}
