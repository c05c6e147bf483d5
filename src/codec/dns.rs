//! RFC 8484/7858 DNS wire-format framing used by the DoT and DoH-raw
//! transports. The DNS message itself is carried opaquely — this module
//! only handles the length-prefix framing DoT requires over raw TLS.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum Error {
    #[error("DNS response declared a length of 0")]
    EmptyResponse,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// RFC 7858 §3.3: DoT queries/responses are each preceded by a 2-byte
/// big-endian length. Write `query` length-prefixed to `stream`.
pub async fn write_length_prefixed<W>(stream: &mut W, query: &[u8]) -> Result<(), Error>
where
    W: AsyncWriteExt + Unpin,
{
    let len = u16::try_from(query.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "DNS query too large for DoT")
    })?;
    let mut framed = BytesMut::with_capacity(2 + query.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(query);
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed DNS message from `stream` (§4.8 DoT).
pub async fn read_length_prefixed<R>(stream: &mut R) -> Result<Bytes, Error>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 2];
    stream.read_exact(&mut len_bytes).await?;
    let len = u16::from_be_bytes(len_bytes);
    if len == 0 {
        return Err(Error::EmptyResponse);
    }
    let mut payload = vec![0u8; usize::from(len)];
    stream.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Whether a request is shaped like a DNS-over-HTTPS POST (§4.8): method
/// must be `POST` and `Content-Type` must be `application/dns-message`.
#[must_use]
pub fn is_valid_dns_request(method: &http::Method, content_type: Option<&str>) -> bool {
    method == http::Method::POST && content_type == Some("application/dns-message")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn length_prefix_round_trips() {
        let query = b"fake-dns-query-bytes";
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, query).await.unwrap();
        assert_eq!(&buf[..2], &(query.len() as u16).to_be_bytes());

        let mut reader = &buf[..];
        let parsed = read_length_prefixed(&mut reader).await.unwrap();
        assert_eq!(parsed.as_ref(), query);
    }

    #[test]
    fn validates_dns_request_shape() {
        assert!(is_valid_dns_request(
            &http::Method::POST,
            Some("application/dns-message")
        ));
        assert!(!is_valid_dns_request(&http::Method::GET, Some("application/dns-message")));
        assert!(!is_valid_dns_request(&http::Method::POST, Some("text/plain")));
    }
}
