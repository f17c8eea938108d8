//! Builds the server's `TlsAcceptor` from a PEM certificate chain and private key path. TLS
//! provisioning itself (issuing or rotating the cert) is external to the core; this module only
//! consumes the two file paths the config hands it.

use std::io::Cursor;
use std::sync::Arc;

use rustls_pemfile::{certs, pkcs8_private_keys};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::errors::ConfigError;

pub async fn build_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, ConfigError> {
    let cert_data = tokio::fs::read(cert_path).await?;
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut Cursor::new(&cert_data))
        .filter_map(Result::ok)
        .collect();
    if cert_chain.is_empty() {
        return Err(ConfigError::Tls("no certificates found in cert file".into()));
    }

    let key_data = tokio::fs::read(key_path).await?;
    let key: PrivateKeyDer<'static> = pkcs8_private_keys(&mut Cursor::new(&key_data))
        .filter_map(Result::ok)
        .map(PrivateKeyDer::Pkcs8)
        .next()
        .ok_or_else(|| ConfigError::Tls("no private key found in key file".into()))?;

    let tls_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| ConfigError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}
