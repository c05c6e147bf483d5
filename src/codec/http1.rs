//! Hand-rolled HTTP/1.1 client codec (§4.4): request serialization and a
//! streaming response parser that never buffers a full body.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use http::{HeaderMap, HeaderValue, Method};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Errors from the HTTP/1.1 client codec.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid status line")]
    InvalidStatusLine,
    #[error("Invalid header line")]
    InvalidHeader,
    #[error("unexpected EOF while reading chunked body")]
    ChunkedEof,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The parsed status line and headers of an HTTP/1.1 response.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

/// §4.4 step 3: how the body is delimited.
#[derive(Debug, Clone, Copy)]
enum TransferMode {
    Chunked,
    Fixed(u64),
    EndOfStream,
}

/// Serialize and write `"{METHOD} {path}{search} HTTP/1.1\r\n"` followed by
/// folded headers and the blank line terminating them (§4.3 step 3).
pub async fn write_request_head<W>(
    writer: &mut W,
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!("{method} {path_and_query} HTTP/1.1\r\n");
    for (name, value) in headers {
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(value.to_str().unwrap_or_default());
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes()).await?;
    Ok(())
}

/// Copy a request body to the upstream writer chunk-by-chunk (§4.3 step 4).
pub async fn write_body<W, B>(writer: &mut W, body: &mut B) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
    B: AsyncRead + Unpin,
{
    tokio::io::copy(body, writer).await?;
    Ok(())
}

/// §4.4 steps 1-2: read until `CRLF CRLF` and parse the status line and
/// headers. `reader` retains any body bytes already buffered past the
/// header block, ready for `read_body`.
pub async fn read_response_head<R>(reader: &mut R) -> Result<ResponseHead, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let status_line = line.trim_end_matches(['\r', '\n']);
    let (status, reason) = parse_status_line(status_line)?;

    let mut headers = HeaderMap::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::InvalidHeader);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed.split_once(": ").ok_or(Error::InvalidHeader)?;
        let name = http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader)?;
        let value = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader)?;
        headers.append(name, value);
    }

    Ok(ResponseHead {
        status,
        reason,
        headers,
    })
}

/// `^HTTP/1\.[01] (\d+) (.*)$`
fn parse_status_line(line: &str) -> Result<(u16, String), Error> {
    let rest = line
        .strip_prefix("HTTP/1.0 ")
        .or_else(|| line.strip_prefix("HTTP/1.1 "))
        .ok_or(Error::InvalidStatusLine)?;
    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = code.parse().map_err(|_| Error::InvalidStatusLine)?;
    Ok((status, reason.to_owned()))
}

fn transfer_mode(headers: &HeaderMap) -> TransferMode {
    let chunked = headers
        .get(http::header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return TransferMode::Chunked;
    }
    if let Some(len) = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return TransferMode::Fixed(len);
    }
    TransferMode::EndOfStream
}

/// A response body delivered as a stream of chunks, produced by a
/// background task draining the socket reader (§4.4 step 4) so the parser
/// never holds the whole body in memory at once.
pub struct BodyStream {
    rx: mpsc::Receiver<std::io::Result<Bytes>>,
}

impl Stream for BodyStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start streaming the response body for a just-parsed `head` off `reader`.
pub fn read_body<R>(reader: R, head: &ResponseHead) -> BodyStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mode = transfer_mode(&head.headers);
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(produce_body(reader, mode, tx));
    BodyStream { rx }
}

const READ_CHUNK: usize = 16 * 1024;

async fn produce_body<R>(
    mut reader: R,
    mode: TransferMode,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
) where
    R: AsyncBufRead + Unpin,
{
    let result = match mode {
        TransferMode::Fixed(len) => produce_fixed(&mut reader, len, &tx).await,
        TransferMode::Chunked => produce_chunked(&mut reader, &tx).await,
        TransferMode::EndOfStream => produce_eof(&mut reader, &tx).await,
    };
    if let Err(e) = result {
        let _ = tx.send(Err(e)).await;
    }
}

async fn produce_fixed<R>(
    reader: &mut R,
    mut remaining: u64,
    tx: &mpsc::Sender<std::io::Result<Bytes>>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before content-length was satisfied",
            ));
        }
        remaining -= n as u64;
        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}

async fn produce_eof<R>(
    reader: &mut R,
    tx: &mpsc::Sender<std::io::Result<Bytes>>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
            return Ok(());
        }
    }
}

async fn produce_chunked<R>(
    reader: &mut R,
    tx: &mpsc::Sender<std::io::Result<Bytes>>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut size_line = String::new();
        let n = reader.read_line(&mut size_line).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                Error::ChunkedEof,
            ));
        }
        // A chunk extension (";...") may follow the size; ignore it.
        let size_str = size_line
            .trim_end_matches(['\r', '\n'])
            .split(';')
            .next()
            .unwrap_or("");
        let size = u64::from_str_radix(size_str, 16)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, Error::InvalidChunkSize))?;
        if size == 0 {
            // Drain any trailing headers up to the final blank line.
            loop {
                let mut trailer = String::new();
                let n = reader.read_line(&mut trailer).await?;
                if n == 0 || trailer.trim_end_matches(['\r', '\n']).is_empty() {
                    break;
                }
            }
            return Ok(());
        }
        let mut remaining = size;
        let mut buf = vec![0u8; READ_CHUNK];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    Error::ChunkedEof,
                ));
            }
            remaining -= n as u64;
            if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                return Ok(());
            }
        }
        // Consume the CRLF following the chunk data.
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }
}

/// Read an entire response body into one buffer. Used only where the spec
/// expects a fully-buffered body (DoH-raw, DoT): small, bounded DNS
/// payloads, never the general HTTP response path.
pub async fn read_body_to_end<R>(reader: R, head: &ResponseHead) -> Result<Bytes, Error>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    use futures_util::StreamExt;
    let mut stream = read_body(reader, head);
    let mut out = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out.freeze())
}
