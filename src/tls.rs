//! TLS client connector, shared by every transport that opens its own raw
//! socket (`Socket`, `Socks5`, DoH-raw, DoT).
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::io;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid DNS name for TLS SNI: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn root_store() -> rustls::RootCertStore {
    let mut store = rustls::RootCertStore::empty();
    #[cfg(feature = "rustls-native-roots")]
    {
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            // Skip certs the platform store reports as malformed rather
            // than failing the whole connector.
            let _ = store.add(cert);
        }
    }
    #[cfg(all(not(feature = "rustls-native-roots"), feature = "rustls-webpki-roots"))]
    {
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}

fn client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    Arc::clone(CONFIG.get_or_init(|| {
        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store())
                .with_no_client_auth(),
        )
    }))
}

/// Wrap an already-connected TCP stream in TLS, validating the peer
/// certificate against `hostname` (used as the SNI and for hostname
/// verification).
pub async fn connect(hostname: &str, tcp: TcpStream) -> io::Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(client_config());
    let server_name = ServerName::try_from(hostname.to_owned())
        .map_err(Error::from)
        .map_err(io::Error::other)?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(io::Error::from)
}
