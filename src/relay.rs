//! WebSocket frame relay (§4.3 step 6, §5 concurrency model): pumps frames
//! between the ambient host's inbound WebSocket (server role, accepted by
//! `tokio-tungstenite`) and the hand-rolled upstream client codec over a
//! `ByteStream`.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::bytestream::ByteStream;
use crate::codec::websocket::{self, Opcode, Reassembled, Reassembler};

/// Pump frames in both directions until either side closes or the upstream
/// reader errors. Spawns one task to drain the upstream reader into the
/// inbound sink; the outbound direction is driven directly from the
/// inbound stream's message events, as §5 describes.
pub async fn relay<S>(inbound: WebSocketStream<S>, upstream: ByteStream)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (inbound_sink, mut inbound_stream) = inbound.split();
    let (upstream_read, upstream_write) = tokio::io::split(upstream);

    let reader_task = tokio::spawn(pump_upstream_to_inbound(
        tokio::io::BufReader::new(upstream_read),
        inbound_sink,
    ));

    let mut upstream_write = upstream_write;
    while let Some(message) = inbound_stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            Message::Close(_) => break,
            Message::Text(text) => {
                if write_text(&mut upstream_write, text.as_bytes()).await.is_err() {
                    break;
                }
            }
            Message::Binary(data) => {
                if write_text(&mut upstream_write, &data).await.is_err() {
                    break;
                }
            }
            // Ping/Pong/raw-Frame variants carry no payload the upstream
            // protocol defines a forwarding rule for; dropped silently.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    // Tear down the whole connection (half-close is disabled per §4.3) so
    // the reader task's next read observes EOF and exits.
    let _ = tokio::io::AsyncWriteExt::shutdown(&mut upstream_write).await;
    let _ = reader_task.await;
}

async fn write_text<W>(writer: &mut W, payload: &[u8]) -> Result<(), websocket::Error>
where
    W: AsyncWrite + Unpin,
{
    let frame = websocket::pack_text_frame(payload)?;
    websocket::write_frame(writer, &frame).await
}

async fn pump_upstream_to_inbound<R, S>(
    mut reader: R,
    mut inbound_sink: futures_util::stream::SplitSink<WebSocketStream<S>, Message>,
) where
    R: AsyncBufRead + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reassembler = Reassembler::default();
    loop {
        let frame = match websocket::read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(_) => break,
        };
        if frame.opcode == Opcode::Close {
            let _ = inbound_sink.send(Message::Close(None)).await;
            break;
        }
        match reassembler.feed(frame) {
            Reassembled::Pending => continue,
            Reassembled::Message { opcode, payload } => {
                let message = if opcode == Opcode::Binary {
                    Message::Binary(payload)
                } else {
                    Message::text(String::from_utf8_lossy(&payload).into_owned())
                };
                if inbound_sink.send(message).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = inbound_sink.close().await;
}
