//! Exercises the WebSocket frame relay against a real inbound WebSocket
//! (a `tokio-tungstenite` client wired to the relay's server-role stream
//! over an in-memory duplex) and a real upstream speaking the hand-rolled
//! frame format over a loopback TCP connection.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use futures_util::{SinkExt, StreamExt};
use relaygate_core::bytestream::ByteStream;
use relaygate_core::relay::relay;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

#[tokio::test]
async fn relays_frames_both_directions_between_browser_and_upstream() {
    let (browser_side, server_side) = tokio::io::duplex(4096);
    let inbound = WebSocketStream::from_raw_socket(server_side, Role::Server, None).await;
    let mut browser = WebSocketStream::from_raw_socket(browser_side, Role::Client, None).await;

    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_listener.local_addr().unwrap();
    let upstream_server = tokio::spawn(async move {
        let (mut stream, _) = upstream_listener.accept().await.unwrap();

        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        let len = usize::from(header[1] & 0x7F);
        let mut mask = [0u8; 4];
        stream.read_exact(&mut mask).await.unwrap();
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= mask[i % 4];
        }
        assert_eq!(payload, b"ping");

        let mut frame = vec![0x81u8, 4];
        frame.extend_from_slice(b"pong");
        stream.write_all(&frame).await.unwrap();
        stream.write_all(&[0x88, 0x00]).await.unwrap();
    });

    let upstream = ByteStream::Plain(TcpStream::connect(upstream_addr).await.unwrap());
    let relay_task = tokio::spawn(relay(inbound, upstream));

    browser.send(Message::text("ping".to_owned())).await.unwrap();

    let reply = browser.next().await.unwrap().unwrap();
    assert_eq!(reply.into_text().unwrap().to_string(), "pong");

    match browser.next().await {
        Some(Ok(Message::Close(_))) => {}
        other => panic!("expected a close message, got {other:?}"),
    }
    browser.send(Message::Close(None)).await.unwrap();

    upstream_server.await.unwrap();
    relay_task.await.unwrap();
}
