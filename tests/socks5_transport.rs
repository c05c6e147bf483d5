//! Exercises the `Socks5` transport against a minimal loopback proxy that
//! performs a real RFC 1928 handshake and then relays bytes to a second
//! loopback HTTP server, covering the SOCKS5 client and the HTTP/1.1 codec
//! together over an actual tunnel rather than a mocked one.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::Bytes;
use http::{HeaderMap, Method};
use relaygate_core::body::Body;
use relaygate_core::config::Config;
use relaygate_core::request::Request;
use relaygate_core::response::Response;
use relaygate_core::transport::socks5;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Accepts one connection, performs a no-auth SOCKS5 greeting and CONNECT
/// reply (always succeeding, ignoring the requested destination), then
/// splices the client to `upstream_addr` until either side closes.
async fn run_fake_socks5_proxy(listener: TcpListener, upstream_addr: std::net::SocketAddr) {
    let (mut client, _) = listener.accept().await.unwrap();

    let mut greeting = [0u8; 4];
    client.read_exact(&mut greeting).await.unwrap();
    assert_eq!(greeting[0], 0x05);
    assert_eq!(greeting[1..], [0x02, 0x00, 0x02], "expected both methods offered");
    client.write_all(&[0x05, 0x00]).await.unwrap();

    let mut head = [0u8; 4];
    client.read_exact(&mut head).await.unwrap();
    assert_eq!(head[3], 0x03, "expected a domain-name CONNECT request");
    let mut len = [0u8; 1];
    client.read_exact(&mut len).await.unwrap();
    let mut rest = vec![0u8; usize::from(len[0]) + 2];
    client.read_exact(&mut rest).await.unwrap();

    client
        .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await
        .unwrap();

    let mut upstream = TcpStream::connect(upstream_addr).await.unwrap();
    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
}

#[tokio::test]
async fn connect_tunnels_an_http_exchange_through_the_proxy() {
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_listener.local_addr().unwrap();
    let upstream = tokio::spawn(async move {
        let (mut stream, _) = upstream_listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
            .await
            .unwrap();
    });

    let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();
    let proxy = tokio::spawn(run_fake_socks5_proxy(proxy_listener, upstream_addr));

    let mut config = Config::default();
    config.socks5_address = Some(format!("127.0.0.1:{}", proxy_addr.port()));

    let dst_url = url::Url::parse(&format!("http://127.0.0.1:{}/", upstream_addr.port())).unwrap();
    let mut request = Request {
        method: Method::GET,
        headers: HeaderMap::new(),
        body: Body::Buffered(Bytes::new()),
    };

    let response = socks5::connect(&mut request, &dst_url, &config).await.unwrap();
    match response {
        Response::Http { status, body, .. } => {
            assert_eq!(status, 200);
            let mut collected = Vec::new();
            match body {
                Body::Streaming(mut stream) => {
                    use futures_util::StreamExt;
                    while let Some(chunk) = stream.next().await {
                        collected.extend_from_slice(&chunk.unwrap());
                    }
                }
                Body::Buffered(bytes) => collected.extend_from_slice(&bytes),
            }
            assert_eq!(collected, b"ok");
        }
        Response::WebSocketUpgrade { .. } => panic!("expected an HTTP response"),
    }

    upstream.await.unwrap();
    proxy.await.unwrap();
}
