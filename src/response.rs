//! The outbound response a transport produces, ready to be rendered by the
//! ambient host (§4.3 step 6, §5 concurrency model).
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use http::HeaderMap;

use crate::body::Body;
use crate::bytestream::ByteStream;

/// What a transport attempt produced.
pub enum Response {
    /// A plain HTTP response: status, headers, and body.
    Http {
        status: u16,
        headers: HeaderMap,
        body: Body,
    },
    /// The WebSocket path succeeded: the upstream handshake is complete and
    /// `upstream` is ready to exchange frames. The ambient host accepts the
    /// inbound WebSocket upgrade itself and hands both ends to the relay
    /// (§4.3 step 6, §5's frame-translation pumping).
    WebSocketUpgrade { upstream: ByteStream },
}

impl Response {
    #[must_use]
    pub fn ok(body: Body) -> Self {
        Self::Http {
            status: 200,
            headers: HeaderMap::new(),
            body,
        }
    }

    #[must_use]
    pub fn with_content_type(status: u16, content_type: &'static str, body: Body) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static(content_type),
        );
        Self::Http {
            status,
            headers,
            body,
        }
    }
}
