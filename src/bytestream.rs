//! Uniform read/write over raw TCP or TLS-wrapped TCP (§2 ByteStream
//! abstraction), with half-close disabled as every transport in this
//! crate requires.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::tls;

/// A byte stream that is either a bare TCP socket or a TLS-wrapped one.
/// `Socket`, `Socks5`, `DoH-raw` and `DoT` all speak over this.
pub enum ByteStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ByteStream {
    /// Open a TCP connection to `(host, port)`, wrapping it in TLS iff
    /// `use_tls` is set. Half-close is disabled: once either side is done
    /// writing, the whole socket is expected to be torn down rather than
    /// kept half-open, matching every transport's use in this design.
    pub async fn connect(host: &str, port: u16, use_tls: bool) -> io::Result<Self> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;
        if use_tls {
            let stream = tls::connect(host, tcp).await?;
            Ok(Self::Tls(Box::new(stream)))
        } else {
            Ok(Self::Plain(tcp))
        }
    }
}

impl AsyncRead for ByteStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ByteStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Disable half-close: shutdown tears down the whole connection
        // rather than just the write half, per §4.3's "half-open disabled".
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
