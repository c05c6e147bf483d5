//! Exercises the `Socket` transport end to end against a loopback TCP
//! server standing in for an upstream, covering the HTTP/1.1 request
//! serialization and chunked response parsing together rather than in
//! isolation.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Method};
use relaygate_core::body::Body;
use relaygate_core::config::Config;
use relaygate_core::request::Request;
use relaygate_core::response::Response;
use relaygate_core::transport::socket;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn get_request_receives_a_chunked_response_in_full() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        let request_text = String::from_utf8_lossy(&buf[..n]).into_owned();
        assert!(request_text.starts_with("GET /get HTTP/1.1\r\n"));
        assert!(request_text.to_ascii_lowercase().contains("host: 127.0.0.1"));

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n")
            .await
            .unwrap();
    });

    let config = Config::default();
    let dst_url = url::Url::parse(&format!("http://127.0.0.1:{}/get", addr.port())).unwrap();
    let mut request = Request {
        method: Method::GET,
        headers: HeaderMap::new(),
        body: Body::Buffered(Bytes::new()),
    };

    let response = socket::connect(&mut request, &dst_url, &config).await.unwrap();
    match response {
        Response::Http { status, body, .. } => {
            assert_eq!(status, 200);
            let mut collected = Vec::new();
            match body {
                Body::Streaming(mut stream) => {
                    while let Some(chunk) = stream.next().await {
                        collected.extend_from_slice(&chunk.unwrap());
                    }
                }
                Body::Buffered(bytes) => collected.extend_from_slice(&bytes),
            }
            assert_eq!(collected, b"hello world");
        }
        Response::WebSocketUpgrade { .. } => panic!("expected an HTTP response"),
    }

    server.await.unwrap();
}
