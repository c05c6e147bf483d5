//! Request/response body representation (§3 Data Model, §9 Design Notes:
//! request cloning for fallback).
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::config::MAX_BUFFERED_BODY;

/// An inbound or outbound body.
///
/// `Buffered` bodies are cheap to clone (an `Arc`-backed `Bytes`) and are
/// what the controller uses whenever a request might need to be replayed
/// through a fallback transport. `Streaming` bodies are read at most once;
/// a transport attempt that fails partway through a streaming body cannot
/// be retried, per §9's "bodies larger than the bound disable fallback".
pub enum Body {
    Buffered(Bytes),
    Streaming(BodyStream),
}

/// A boxed stream of body chunks, used for the `Streaming` variant.
pub struct BodyStream {
    inner: Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>,
}

impl BodyStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for BodyStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Self::Buffered(Bytes::new())
    }

    /// Whether this body can be cheaply re-read for a fallback attempt.
    #[must_use]
    pub const fn is_replayable(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// A fresh, independent handle to the same bytes, usable by a fallback
    /// attempt after the primary attempt has consumed its own handle. Only
    /// defined for buffered bodies; streaming bodies are single-read by
    /// construction.
    #[must_use]
    pub fn clone_for_fallback(&self) -> Option<Self> {
        match self {
            Self::Buffered(bytes) => Some(Self::Buffered(bytes.clone())),
            Self::Streaming(_) => None,
        }
    }

    /// Decide how to represent a body of the given declared size, per §9:
    /// bodies at or under `MAX_BUFFERED_BODY` are read fully into memory so
    /// fallback remains possible; larger bodies are left as a stream.
    #[must_use]
    pub fn should_buffer(content_length: Option<u64>) -> bool {
        match content_length {
            Some(len) => len <= MAX_BUFFERED_BODY as u64,
            None => false,
        }
    }

    /// Write this body to `writer` chunk-by-chunk (§4.3 step 4). A
    /// `Streaming` body is drained as it goes, since it is single-read.
    pub async fn write_to<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;

        match self {
            Self::Buffered(bytes) => {
                if !bytes.is_empty() {
                    writer.write_all(bytes).await?;
                }
            }
            Self::Streaming(stream) => {
                while let Some(chunk) = stream.next().await {
                    writer.write_all(&chunk?).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_body_is_replayable() {
        let body = Body::Buffered(Bytes::from_static(b"hello"));
        assert!(body.is_replayable());
        let clone = body.clone_for_fallback().unwrap();
        match clone {
            Body::Buffered(bytes) => assert_eq!(bytes, Bytes::from_static(b"hello")),
            Body::Streaming(_) => panic!("expected buffered clone"),
        }
    }

    #[test]
    fn should_buffer_respects_bound() {
        assert!(Body::should_buffer(Some(1024)));
        assert!(!Body::should_buffer(Some(MAX_BUFFERED_BODY as u64 + 1)));
        assert!(!Body::should_buffer(None));
    }
}
