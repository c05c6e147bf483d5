//! Dispatch & fallback controller (§4.1): selects a transport per request
//! and recovers from restricted-network errors by re-issuing through a
//! fallback transport without losing the request body.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

pub mod route;

use crate::config::Config;
use crate::error::StatusError;
use crate::request::{DnsVariant, Request};
use crate::response::Response;
use crate::transport::Transport;
use route::Destination;

/// Dispatch one inbound request (§4.1 steps 1-5). `path` and `query` are the
/// raw request-target components; everything else comes from the
/// process-wide configuration bag.
#[tracing::instrument(skip(request, config), fields(path = %path))]
pub async fn dispatch(
    request: &mut Request,
    path: &str,
    query: Option<&str>,
    config: &Config,
) -> Result<Response, StatusError> {
    match route::route(path, query, &config.auth_token, &config.default_dst_url) {
        Destination::Dns(variant) => dispatch_dns(request, variant, config).await,
        Destination::Proxy(dst_url) => dispatch_proxy(request, &dst_url, config).await,
    }
}

async fn dispatch_dns(
    request: &mut Request,
    variant: DnsVariant,
    config: &Config,
) -> Result<Response, StatusError> {
    let transport = match variant {
        DnsVariant::Doh => Transport::Doh,
        DnsVariant::Dot => Transport::Dot,
    };
    transport.handle_dns_query(request, config).await
}

async fn dispatch_proxy(
    request: &mut Request,
    dst_url: &url::Url,
    config: &Config,
) -> Result<Response, StatusError> {
    let transport = Transport::from_strategy(config.proxy_strategy);

    // §4.1 step 4: only the primary attempt's fallback-eligible transports
    // get a preserved clone up front, since cloning is only possible for a
    // buffered body and would otherwise be wasted work.
    let fallback_request = if transport.may_fall_back() {
        request.clone_for_fallback()
    } else {
        None
    };

    match transport.connect(request, dst_url, config).await {
        Ok(response) => Ok(response),
        Err(err) if transport.may_fall_back() && err.is_network_restricted() => {
            let Some(mut fallback_request) = fallback_request else {
                // Body too large to buffer: fallback is disabled for
                // correctness (§9), so the primary error surfaces verbatim.
                return Err(err);
            };
            let fallback_transport = Transport::from_strategy(config.fallback_proxy_strategy);
            fallback_transport
                .connect(&mut fallback_request, dst_url, config)
                .await
        }
        Err(err) => Err(err),
    }
}
