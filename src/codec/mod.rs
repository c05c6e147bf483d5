//! Hand-rolled wire codecs that operate directly over a byte stream: the
//! HTTP/1.1 client, the WebSocket client, and the SOCKS5 client.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

pub mod dns;
pub mod http1;
pub mod socks5;
pub mod websocket;
