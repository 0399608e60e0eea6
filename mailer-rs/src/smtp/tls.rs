//! Client-side TLS for STARTTLS
//!
//! Trust roots are the Mozilla set from `webpki-roots`, optionally extended
//! with certificates from a PEM bundle (private relays, test servers).

use crate::smtp::transport::TransportError;
use rustls::{Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use rustls_pemfile::certs;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

/// Build a TLS connector trusting the webpki roots plus `extra_roots`
pub fn connector(extra_roots: &[Certificate]) -> Result<TlsConnector, TransportError> {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    for cert in extra_roots {
        root_store
            .add(cert)
            .map_err(|e| TransportError::Tls(format!("Failed to add root certificate: {}", e)))?;
    }

    // rustls 0.21 API
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Load every certificate from a PEM file
pub fn load_pem_certificates<P: AsRef<Path>>(path: P) -> Result<Vec<Certificate>, TransportError> {
    info!("Loading trusted certificates from {:?}", path.as_ref());

    let file = File::open(path.as_ref())
        .map_err(|e| TransportError::Tls(format!("Failed to open certificate file: {}", e)))?;
    let mut reader = BufReader::new(file);

    let certs = certs(&mut reader)
        .map_err(|e| TransportError::Tls(format!("Failed to read certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(TransportError::Tls("No certificates found in file".to_string()));
    }

    debug!("Loaded {} certificate(s)", certs.len());
    Ok(certs.into_iter().map(Certificate).collect())
}

/// SNI / verification name for the endpoint host
pub fn server_name(host: &str) -> Result<ServerName, TransportError> {
    ServerName::try_from(host)
        .map_err(|e| TransportError::Tls(format!("Invalid server name '{}': {}", host, e)))
}
