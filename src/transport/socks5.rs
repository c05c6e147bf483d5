//! The `Socks5` transport (§4.6): tunnel the HTTP or WebSocket exchange
//! through a SOCKS5 proxy's CONNECT.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::body::Body;
use crate::bytestream::ByteStream;
use crate::codec::{http1, socks5 as socks5_codec, websocket};
use crate::config::Config;
use crate::header;
use crate::request::Request;
use crate::response::Response;
use crate::tls;

#[derive(Debug, Error)]
pub enum Error {
    #[error("SOCKS5_ADDRESS is not configured")]
    NotConfigured,
    #[error("invalid SOCKS5 address {0:?}: expected [user:pass@]host:port")]
    InvalidAddress(String),
    #[error("destination scheme {0:?} is not a WebSocket scheme")]
    NotAWebSocketScheme(String),
    #[error("WebSocket handshake did not return 101 Switching Protocols")]
    HandshakeRejected,
    #[error(transparent)]
    Socks5(#[from] socks5_codec::Error),
    #[error(transparent)]
    Http1(#[from] http1::Error),
    #[error(transparent)]
    WebSocket(#[from] websocket::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct Endpoint {
    credentials: Option<socks5_codec::Credentials>,
    hostname: String,
    port: u16,
}

/// Parse `"[user:pass@]host:port"` (§3 Data Model). An IPv6 literal host
/// must be bracketed if it contains colons.
fn parse_endpoint(address: &str) -> Result<Endpoint, Error> {
    let (auth, host_port) = match address.rsplit_once('@') {
        Some((auth, rest)) => (Some(auth), rest),
        None => (None, address),
    };
    let credentials = auth
        .map(|auth| {
            auth.split_once(':')
                .map(|(username, password)| socks5_codec::Credentials {
                    username: username.to_owned(),
                    password: password.to_owned(),
                })
                .ok_or_else(|| Error::InvalidAddress(address.to_owned()))
        })
        .transpose()?;

    let (hostname, port) = if let Some(rest) = host_port.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidAddress(address.to_owned()))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| Error::InvalidAddress(address.to_owned()))?;
        (host.to_owned(), port)
    } else {
        host_port
            .rsplit_once(':')
            .map(|(host, port)| (host.to_owned(), port))
            .ok_or_else(|| Error::InvalidAddress(address.to_owned()))?
    };
    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidAddress(address.to_owned()))?;

    Ok(Endpoint {
        credentials,
        hostname,
        port,
    })
}

/// Connect to the configured SOCKS5 proxy, negotiate CONNECT to
/// `dst_url`'s host/port, and wrap the tunnel in TLS when the destination
/// scheme requires it (the `ByteStream` this returns behaves identically
/// to the `Socket` transport's, per the abstraction's own doc comment).
async fn open_tunnel(dst_url: &url::Url, config: &Config) -> Result<ByteStream, Error> {
    let address = config.socks5_address.as_ref().ok_or(Error::NotConfigured)?;
    let endpoint = parse_endpoint(address)?;

    let dst_port = dst_url
        .port()
        .unwrap_or_else(|| if matches!(dst_url.scheme(), "https" | "wss") { 443 } else { 80 });
    let dst_host = dst_url.host_str().unwrap_or_default().to_owned();

    let mut stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((endpoint.hostname.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connection failed"))??;
    stream.set_nodelay(true)?;

    socks5_codec::connect(&mut stream, &dst_host, dst_port, endpoint.credentials.as_ref()).await?;

    if matches!(dst_url.scheme(), "https" | "wss") {
        let tls_stream = tls::connect(&dst_host, stream).await?;
        Ok(ByteStream::Tls(Box::new(tls_stream)))
    } else {
        Ok(ByteStream::Plain(stream))
    }
}

pub async fn connect(request: &mut Request, dst_url: &url::Url, config: &Config) -> Result<Response, Error> {
    if matches!(dst_url.scheme(), "ws" | "wss") {
        return connect_websocket(request, dst_url, config).await;
    }

    let mut stream = open_tunnel(dst_url, config).await?;

    let mut headers = header::sanitize(&request.headers);
    header::set(&mut headers, "host", dst_url.host_str().unwrap_or_default());
    header::set(&mut headers, "accept-encoding", "identity");

    let path_and_query = match dst_url.query() {
        Some(query) => format!("{}?{}", dst_url.path(), query),
        None => dst_url.path().to_owned(),
    };
    http1::write_request_head(&mut stream, &request.method, &path_and_query, &headers).await?;
    request.body.write_to(&mut stream).await?;
    stream.flush().await?;

    let (read_half, _write_half) = tokio::io::split(stream);
    let mut reader = tokio::io::BufReader::new(read_half);
    let head = http1::read_response_head(&mut reader).await?;
    let body = http1::read_body(reader, &head);

    Ok(Response::Http {
        status: head.status,
        headers: head.headers,
        body: Body::Streaming(crate::body::BodyStream::new(body)),
    })
}

async fn connect_websocket(
    request: &mut Request,
    dst_url: &url::Url,
    config: &Config,
) -> Result<Response, Error> {
    if !matches!(dst_url.scheme(), "ws" | "wss") {
        return Err(Error::NotAWebSocketScheme(dst_url.scheme().to_owned()));
    }

    let mut stream = open_tunnel(dst_url, config).await?;

    let key = websocket::generate_key();
    let mut headers = header::sanitize(&request.headers);
    header::set(&mut headers, "host", dst_url.host_str().unwrap_or_default());
    header::set(&mut headers, "connection", "Upgrade");
    header::set(&mut headers, "upgrade", "websocket");
    header::set(&mut headers, "sec-websocket-version", "13");
    header::set(&mut headers, "sec-websocket-key", key.as_str());

    let path_and_query = match dst_url.query() {
        Some(query) => format!("{}?{}", dst_url.path(), query),
        None => dst_url.path().to_owned(),
    };
    http1::write_request_head(&mut stream, &http::Method::GET, &path_and_query, &headers).await?;
    stream.flush().await?;

    let status_line = websocket::read_handshake_response(&mut stream).await?;
    if !websocket::is_successful_handshake(&status_line) {
        return Err(Error::HandshakeRejected);
    }

    Ok(Response::WebSocketUpgrade { upstream: stream })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_without_credentials() {
        let endpoint = parse_endpoint("proxy.example:1080").unwrap();
        assert!(endpoint.credentials.is_none());
        assert_eq!(endpoint.hostname, "proxy.example");
        assert_eq!(endpoint.port, 1080);
    }

    #[test]
    fn parses_endpoint_with_credentials() {
        let endpoint = parse_endpoint("alice:secret@proxy.example:1080").unwrap();
        let creds = endpoint.credentials.unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "secret");
        assert_eq!(endpoint.hostname, "proxy.example");
        assert_eq!(endpoint.port, 1080);
    }

    #[test]
    fn parses_bracketed_ipv6_host() {
        let endpoint = parse_endpoint("[::1]:1080").unwrap();
        assert_eq!(endpoint.hostname, "::1");
        assert_eq!(endpoint.port, 1080);
    }
}
