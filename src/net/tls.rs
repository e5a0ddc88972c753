//! Listener TLS configuration.

use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

use crate::config::TlsConfig;

/// Load the rustls configuration for the listener from PEM files.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, std::io::Error> {
    let cert_path = Path::new(&tls.cert_path);
    let key_path = Path::new(&tls.key_path);

    for (kind, path) in [("certificate", cert_path), ("private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} file not found: {:?}", kind, path),
            ));
        }
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}
