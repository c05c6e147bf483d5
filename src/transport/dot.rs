//! The `DoT` transport (§4.8): DNS-over-TLS over a raw length-prefixed TLS
//! socket, falling back to DoH-via-fetch on any failure.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use thiserror::Error;
use tokio::net::TcpStream;

use crate::body::Body;
use crate::codec::dns;
use crate::config::Config;
use crate::request::Request;
use crate::response::Response;
use crate::tls;
use crate::transport::doh;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Client(String),
    #[error("DoT failed and the DoH fallback also failed: {0}")]
    FallbackFailed(String),
}

/// §4.8 DoT: write the length-prefixed query, read the length-prefixed
/// response. On any failure, retry through the DoH-fetch path with the same
/// query bytes; a double failure is a gateway failure (502).
pub async fn handle(request: &mut Request, config: &Config) -> Result<Response, Error> {
    if !dns::is_valid_dns_request(
        &request.method,
        request
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    ) {
        return Err(Error::Client(
            "DNS request must be POST with Content-Type: application/dns-message".to_owned(),
        ));
    }

    let query = match &request.body {
        Body::Buffered(bytes) => bytes.clone(),
        Body::Streaming(_) => {
            return Err(Error::Client("DNS query body must be bounded".to_owned()))
        }
    };

    match try_dot(&query, config).await {
        Ok(response) => Ok(response),
        Err(primary_err) => match doh::fetch_dns_query(&query, config).await {
            Ok(response) => Ok(response),
            Err(fallback_err) => Err(Error::FallbackFailed(format!(
                "{primary_err} / {fallback_err}"
            ))),
        },
    }
}

async fn try_dot(query: &[u8], config: &Config) -> Result<Response, std::io::Error> {
    let tcp = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.dot_server_hostname.as_str(), config.dot_server_port)),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connection failed"))??;

    let mut stream = tls::connect(&config.dot_server_hostname, tcp).await?;
    dns::write_length_prefixed(&mut stream, query)
        .await
        .map_err(std::io::Error::other)?;
    let response = dns::read_length_prefixed(&mut stream)
        .await
        .map_err(std::io::Error::other)?;

    Ok(Response::with_content_type(
        200,
        "application/dns-message",
        Body::Buffered(response),
    ))
}
