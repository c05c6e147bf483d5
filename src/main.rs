//! The ambient HTTP(S) host: accepts inbound connections, recovers a
//! destination or DNS request from the URL path, and hands it to the
//! dispatch controller. This is the one piece of the design explicitly
//! deferred to the host runtime; everything else lives in `relaygate_core`.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
#![forbid(unsafe_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use futures_util::StreamExt;
use http::header::{CONNECTION, CONTENT_LENGTH, UPGRADE};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, trace};
use tracing_subscriber::{filter, fmt, prelude::*, reload};

use relaygate_core::body::{Body as GatewayBody, BodyStream as GatewayBodyStream};
use relaygate_core::config::{Config, HostConfig};
use relaygate_core::controller;
use relaygate_core::dupe::Dupe;
use relaygate_core::error::StatusError;
use relaygate_core::relay;
use relaygate_core::request::Request as GatewayRequest;
use relaygate_core::response::Response as GatewayResponse;

#[derive(Debug, Error)]
enum Error {
    #[error("invalid listening address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const QUIET_QUIET_LOG_LEVEL: filter::LevelFilter = filter::LevelFilter::ERROR;
const QUIET_LOG_LEVEL: filter::LevelFilter = filter::LevelFilter::WARN;
const DEFAULT_LOG_LEVEL: filter::LevelFilter = filter::LevelFilter::INFO;
const VERBOSE_LOG_LEVEL: filter::LevelFilter = filter::LevelFilter::DEBUG;
const VERBOSE_VERBOSE_LOG_LEVEL: filter::LevelFilter = filter::LevelFilter::TRACE;

/// CLI flags layered over the environment-loaded `HostConfig` (§AMBIENT
/// STACK Configuration); core gateway settings stay environment-only, per
/// the core's own `Config::from_env`.
#[derive(Debug, Parser)]
#[command(name = "relaygate", version, about = "Multi-strategy HTTP/WebSocket/DNS forwarding gateway")]
struct GatewayCli {
    /// Override LISTEN_HOST.
    #[arg(long)]
    listen_host: Option<String>,
    /// Override LISTEN_PORT.
    #[arg(long)]
    listen_port: Option<u16>,
    /// Increase log verbosity (stackable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Decrease log verbosity (stackable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

type ResponseBody = BoxBody<Bytes, std::io::Error>;

async fn main_real() -> Result<(), Error> {
    let reload_handle = {
        let fmt_layer = fmt::Layer::default()
            .compact()
            .with_timer(fmt::time::time())
            .with_writer(std::io::stderr);
        let (level_layer, reload_handle) = reload::Layer::new(DEFAULT_LOG_LEVEL);
        tracing_subscriber::registry()
            .with(level_layer)
            .with(fmt_layer)
            .init();
        reload_handle
    };

    let cli = GatewayCli::parse();
    trace!("cli = {cli:?}");
    match cli.verbose {
        0 => {}
        1 => reload_handle
            .reload(VERBOSE_LOG_LEVEL)
            .expect("resetting log level failed (this is a bug)"),
        _ => reload_handle
            .reload(VERBOSE_VERBOSE_LOG_LEVEL)
            .expect("resetting log level failed (this is a bug)"),
    }
    match cli.quiet {
        0 => {}
        1 => reload_handle
            .reload(QUIET_LOG_LEVEL)
            .expect("resetting log level failed (this is a bug)"),
        _ => reload_handle
            .reload(QUIET_QUIET_LOG_LEVEL)
            .expect("resetting log level failed (this is a bug)"),
    }

    let config = Arc::new(Config::from_env());
    let mut host_config = HostConfig::from_env();
    if let Some(listen_host) = cli.listen_host {
        host_config.listen_host = listen_host;
    }
    if let Some(listen_port) = cli.listen_port {
        host_config.listen_port = listen_port;
    }

    let addr: SocketAddr = format!("{}:{}", host_config.listen_host, host_config.listen_port)
        .parse()
        .map_err(Error::InvalidAddress)?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("failed to accept a connection: {e}");
                continue;
            }
        };
        let config = config.dupe();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle(req, config.dupe()));
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                debug!("connection from {peer_addr} closed with an error: {e}");
            }
        });
    }
}

/// Per-request entry point: recover the gateway-facing request and the raw
/// path/query, dispatch, and translate the outcome into a hyper response.
/// A `WebSocketUpgrade` outcome additionally spawns the frame relay once
/// hyper completes the protocol upgrade for this connection.
#[tracing::instrument(skip(req, config), fields(method = %req.method(), path = %req.uri().path()))]
async fn handle(
    mut req: hyper::Request<Incoming>,
    config: Arc<Config>,
) -> Result<hyper::Response<ResponseBody>, Infallible> {
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(ToOwned::to_owned);
    let method = req.method().clone();
    let headers = req.headers().clone();
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let wants_upgrade = is_websocket_upgrade_request(&headers);
    let upgrade = wants_upgrade.then(|| hyper::upgrade::on(&mut req));

    let body = match read_gateway_body(req.into_body(), content_length).await {
        Ok(body) => body,
        Err(e) => return Ok(error_response(StatusError::client(e.to_string()))),
    };
    let mut gateway_request = GatewayRequest {
        method,
        headers,
        body,
    };

    let outcome = controller::dispatch(&mut gateway_request, &path, query.as_deref(), &config).await;
    match outcome {
        Ok(GatewayResponse::Http { status, headers, body }) => Ok(http_response(status, headers, body)),
        Ok(GatewayResponse::WebSocketUpgrade { upstream }) => {
            let Some(upgrade) = upgrade else {
                return Ok(error_response(StatusError::upstream(
                    "transport returned a WebSocket upgrade for a non-upgrade request",
                )));
            };
            tokio::spawn(async move {
                match upgrade.await {
                    Ok(upgraded) => {
                        let io = TokioIo::new(upgraded);
                        let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                        relay::relay(ws, upstream).await;
                    }
                    Err(e) => error!("hyper upgrade failed: {e}"),
                }
            });
            Ok(switching_protocols_response())
        }
        Err(status_error) => Ok(error_response(status_error)),
    }
}

fn is_websocket_upgrade_request(headers: &http::HeaderMap) -> bool {
    let connection_has_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    let upgrade_is_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    connection_has_upgrade && upgrade_is_websocket
}

/// Read the inbound body per §9's buffering rule: small, bounded bodies are
/// read fully so the controller can clone them for a fallback attempt;
/// larger bodies are left as a stream.
async fn read_gateway_body(body: Incoming, content_length: Option<u64>) -> std::io::Result<GatewayBody> {
    if GatewayBody::should_buffer(content_length) {
        let collected = body.collect().await.map_err(std::io::Error::other)?;
        Ok(GatewayBody::Buffered(collected.to_bytes()))
    } else {
        let stream = BodyStream::new(body).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) => Some(Err(std::io::Error::other(e))),
            }
        });
        Ok(GatewayBody::Streaming(GatewayBodyStream::new(stream)))
    }
}

fn http_response(status: u16, headers: http::HeaderMap, body: GatewayBody) -> hyper::Response<ResponseBody> {
    let mut builder = hyper::Response::builder().status(status);
    for (name, value) in &headers {
        if matches!(name.as_str(), "transfer-encoding" | "content-length") {
            continue;
        }
        builder = builder.header(name.clone(), value.clone());
    }
    builder
        .body(gateway_body_to_hyper(body))
        .unwrap_or_else(|_| error_response(StatusError::upstream("failed to build upstream response")))
}

fn gateway_body_to_hyper(body: GatewayBody) -> ResponseBody {
    match body {
        GatewayBody::Buffered(bytes) => Full::new(bytes)
            .map_err(|never: Infallible| match never {})
            .boxed(),
        GatewayBody::Streaming(stream) => {
            BodyExt::boxed(StreamBody::new(stream.map(|chunk| chunk.map(Frame::data))))
        }
    }
}

fn switching_protocols_response() -> hyper::Response<ResponseBody> {
    hyper::Response::builder()
        .status(hyper::StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .body(Full::new(Bytes::new()).map_err(|never: Infallible| match never {}).boxed())
        .expect("a static response builder call cannot fail")
}

/// §4.1's `"Error: …"` body, rendered at the status code the error was
/// classified to (§7).
fn error_response(error: StatusError) -> hyper::Response<ResponseBody> {
    let body = format!("Error: {}", error.message);
    hyper::Response::builder()
        .status(error.class.status_code())
        .body(
            Full::new(Bytes::from(body))
                .map_err(|never: Infallible| match never {})
                .boxed(),
        )
        .expect("a static response builder call cannot fail")
}

#[tokio::main]
async fn main() {
    if let Err(e) = main_real().await {
        error!("giving up: {e}");
        std::process::exit(1);
    }
}
