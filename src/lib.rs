//! Core of the multi-strategy HTTP/WebSocket/DNS forwarding gateway: the
//! dispatch controller, the pluggable transports, and the hand-rolled
//! wire codecs they speak. See `src/main.rs` for the ambient HTTP host that
//! turns this into a runnable binary.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
#![warn(missing_debug_implementations)]
#![forbid(unsafe_code)]

pub mod body;
pub mod bytestream;
pub mod codec;
pub mod config;
pub mod controller;
pub mod dupe;
pub mod error;
pub mod header;
#[cfg(feature = "gateway-binary")]
pub mod relay;
pub mod request;
pub mod response;
pub mod tls;
pub mod transport;
