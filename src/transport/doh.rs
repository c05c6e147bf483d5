//! The `DoH` transport (§4.8): DNS-over-HTTPS over a hand-rolled HTTP/1.1
//! request to a raw TLS socket, falling back to a `fetch`-based DoH POST.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::body::Body;
use crate::codec::{dns, http1};
use crate::config::Config;
use crate::header;
use crate::request::Request;
use crate::response::Response;
use crate::tls;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Client(String),
    #[error("DoH-raw failed and the fetch fallback also failed: {0}")]
    FallbackFailed(String),
}

/// §4.8 DoH-Raw with Fetch fallback.
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

    match try_doh_raw(&query, config).await {
        Ok(response) => Ok(response),
        Err(primary_err) => match fetch_dns_query(&query, config).await {
            Ok(response) => Ok(response),
            Err(fallback_err) => Err(Error::FallbackFailed(format!(
                "{primary_err} / {fallback_err}"
            ))),
        },
    }
}

async fn try_doh_raw(query: &[u8], config: &Config) -> Result<Response, std::io::Error> {
    let tcp = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.doh_server_hostname.as_str(), config.doh_server_port)),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connection failed"))??;

    let mut stream = tls::connect(&config.doh_server_hostname, tcp).await?;

    let mut headers = HeaderMap::new();
    header::set(&mut headers, "host", config.doh_server_hostname.as_str());
    header::set(&mut headers, "content-type", "application/dns-message");
    header::set(&mut headers, "content-length", query.len().to_string());
    header::set(&mut headers, "connection", "close");

    http1::write_request_head(&mut stream, &http::Method::POST, &config.doh_server_path, &headers)
        .await
        .map_err(std::io::Error::other)?;
    stream.write_all(query).await?;
    stream.flush().await?;

    let mut reader = tokio::io::BufReader::new(stream);
    let head = http1::read_response_head(&mut reader)
        .await
        .map_err(std::io::Error::other)?;
    let body = http1::read_body_to_end(reader, &head)
        .await
        .map_err(std::io::Error::other)?;

    Ok(Response::with_content_type(200, "application/dns-message", Body::Buffered(body)))
}

/// DoH-Fetch (§4.8): also used as the fallback path from both DoT and
/// DoH-raw on their own failure.
pub(crate) async fn fetch_dns_query(query: &Bytes, config: &Config) -> Result<Response, reqwest::Error> {
    let url = format!(
        "https://{}{}",
        config.doh_server_hostname, config.doh_server_path
    );
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .unwrap_or_default();

    let upstream_response = client
        .post(url)
        .header("content-type", "application/dns-message")
        .header("accept", "application/dns-message")
        .body(query.clone())
        .send()
        .await?;

    let status = upstream_response.status().as_u16();
    let body = upstream_response.bytes().await?;

    Ok(Response::with_content_type(status, "application/dns-message", Body::Buffered(body)))
}
