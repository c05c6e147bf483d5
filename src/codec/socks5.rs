//! Hand-rolled SOCKS5 client (§4.6): RFC 1928/1929 greeting, optional
//! username/password sub-negotiation, and the CONNECT request/reply.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USERNAME_PASSWORD: u8 = 0x02;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

#[derive(Debug, Error)]
pub enum Error {
    #[error("SOCKS5 server rejected both offered authentication methods")]
    NoAcceptableMethod,
    #[error("SOCKS5 server returned an unrecognized authentication method: {0}")]
    UnrecognizedMethod(u8),
    #[error("SOCKS5 server selected username/password authentication but no credentials are configured")]
    CredentialsRequired,
    #[error("SOCKS5 username/password authentication failed")]
    AuthenticationFailed,
    #[error("SOCKS5 CONNECT request failed with reply code {0}")]
    ConnectFailed(u8),
    #[error("SOCKS5 server returned an unsupported address type: {0}")]
    UnsupportedAddressType(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Optional username/password credentials for SOCKS5 sub-negotiation.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Perform the full SOCKS5 handshake and CONNECT to `(host, port)` over an
/// already-established stream to the SOCKS5 proxy itself. On success the
/// stream is ready to carry the proxied application data.
pub async fn connect<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    credentials: Option<&Credentials>,
) -> Result<(), Error>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let selected_method = greet(stream).await?;
    if selected_method == METHOD_USERNAME_PASSWORD {
        let creds = credentials.ok_or(Error::CredentialsRequired)?;
        authenticate(stream, creds).await?;
    }
    request_connect(stream, host, port).await
}

/// §4.6 step 1: always offer both `NO_AUTH` and `USERNAME_PASSWORD`,
/// regardless of whether credentials are configured for this proxy. Returns
/// the method the server selected, so the caller authenticates based on
/// what the server actually chose rather than on local configuration.
async fn greet<S>(stream: &mut S) -> Result<u8, Error>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let methods: &[u8] = &[METHOD_NO_AUTH, METHOD_USERNAME_PASSWORD];
    let mut request = BytesMut::with_capacity(2 + methods.len());
    request.put_u8(VERSION);
    request.put_u8(methods.len() as u8);
    request.extend_from_slice(methods);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    match response[1] {
        method @ (METHOD_NO_AUTH | METHOD_USERNAME_PASSWORD) => Ok(method),
        METHOD_NO_ACCEPTABLE => Err(Error::NoAcceptableMethod),
        other => Err(Error::UnrecognizedMethod(other)),
    }
}

async fn authenticate<S>(stream: &mut S, credentials: &Credentials) -> Result<(), Error>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let user = credentials.username.as_bytes();
    let pass = credentials.password.as_bytes();
    let mut request = BytesMut::with_capacity(3 + user.len() + pass.len());
    request.put_u8(0x01);
    request.put_u8(user.len() as u8);
    request.extend_from_slice(user);
    request.put_u8(pass.len() as u8);
    request.extend_from_slice(pass);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    if response[1] == 0x00 {
        Ok(())
    } else {
        Err(Error::AuthenticationFailed)
    }
}

/// Build the CONNECT request bytes for `host`/`port`. The domain name form
/// (ATYP 0x03) is always used, per §4.6, rather than resolving the host to
/// an IP address first.
#[must_use]
pub fn build_connect_request(host: &str, port: u16) -> Bytes {
    let host_bytes = host.as_bytes();
    let mut request = BytesMut::with_capacity(7 + host_bytes.len());
    request.put_u8(VERSION);
    request.put_u8(CMD_CONNECT);
    request.put_u8(0x00); // reserved
    request.put_u8(ATYP_DOMAIN);
    request.put_u8(host_bytes.len() as u8);
    request.extend_from_slice(host_bytes);
    request.put_u16(port);
    request.freeze()
}

async fn request_connect<S>(stream: &mut S, host: &str, port: u16) -> Result<(), Error>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let request = build_connect_request(host, port);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    let reply = head[1];
    let atyp = head[3];

    // Drain the bound address the server returns, regardless of reply
    // outcome, so the stream is left positioned at the start of the
    // proxied application data.
    match atyp {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4 + 2];
            stream.read_exact(&mut addr).await?;
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16 + 2];
            stream.read_exact(&mut addr).await?;
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut addr = vec![0u8; usize::from(len[0]) + 2];
            stream.read_exact(&mut addr).await?;
        }
        other => return Err(Error::UnsupportedAddressType(other)),
    }

    if reply == 0x00 {
        Ok(())
    } else {
        Err(Error::ConnectFailed(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_uses_domain_address_type() {
        let request = build_connect_request("example.com", 443);
        let mut expected = vec![0x05, 0x01, 0x00, 0x03, 11];
        expected.extend_from_slice(b"example.com");
        expected.extend_from_slice(&443u16.to_be_bytes());
        assert_eq!(request.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn greet_accepts_no_auth_method() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0x00])
            .build();
        assert_eq!(greet(&mut stream).await.unwrap(), METHOD_NO_AUTH);
    }

    #[tokio::test]
    async fn greet_returns_the_servers_selected_method() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0x02])
            .build();
        assert_eq!(greet(&mut stream).await.unwrap(), METHOD_USERNAME_PASSWORD);
    }

    #[tokio::test]
    async fn connect_errors_when_server_requires_auth_but_no_credentials_are_configured() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0x02])
            .build();
        let err = connect(&mut stream, "example.com", 80, None).await.unwrap_err();
        assert!(matches!(err, Error::CredentialsRequired));
    }

    #[tokio::test]
    async fn greet_rejects_no_acceptable_methods() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0xFF])
            .build();
        let err = greet(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::NoAcceptableMethod));
    }

    #[tokio::test]
    async fn full_handshake_without_auth() {
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 11];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&80u16.to_be_bytes());

        let mut stream = tokio_test::io::Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0x00])
            .write(&request)
            .read(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();
        connect(&mut stream, "example.com", 80, None).await.unwrap();
    }
}
