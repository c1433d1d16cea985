//! SSL upgrade for the MySQL handshake.
//!
//! The upgrade happens mid-handshake: after reading the server greeting the
//! client sends an abbreviated SSL-request packet (the first 32 bytes of a
//! handshake response, with `CLIENT_SSL` set), wraps the socket in TLS, and
//! continues the ordinary handshake on the wrapped stream with the sequence
//! counter running on.
//!
//! TLS itself is feature-gated. Without the `tls` feature the driver still
//! builds; requesting SSL then fails with a not-supported error, matching
//! the C client library's behavior when compiled without OpenSSL.

use mysqlc_core::{Error, Result};

use crate::config::SslMode;
use crate::protocol::{PacketWriter, capabilities};

/// Build the abbreviated SSL-request packet payload (32 bytes).
pub fn ssl_request_payload(client_caps: u32, max_packet_size: u32, charset: u8) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(32);
    w.write_u32_le(client_caps | capabilities::CLIENT_SSL);
    w.write_u32_le(max_packet_size);
    w.write_u8(charset);
    w.write_zeros(23);
    w.into_bytes()
}

/// Does the server advertise SSL support?
pub const fn server_supports_ssl(server_caps: u32) -> bool {
    server_caps & capabilities::CLIENT_SSL != 0
}

/// Decide whether the SSL upgrade should run, reconciling the requested
/// mode with the server's capabilities and this build's TLS support.
pub fn decide_ssl(mode: SslMode, server_caps: u32) -> Result<bool> {
    if !mode.should_try_ssl() {
        return Ok(false);
    }
    if cfg!(not(feature = "tls")) {
        if mode.is_required() {
            return Err(Error::not_supported(
                "client library does not have SSL support",
            ));
        }
        return Ok(false);
    }
    if server_supports_ssl(server_caps) {
        Ok(true)
    } else if mode.is_required() {
        Err(Error::operational(
            crate::errmap::client_errors::CR_CONNECTION_ERROR,
            "SSL is required but the server does not support it",
        ))
    } else {
        Ok(false)
    }
}

#[cfg(feature = "tls")]
pub(crate) use enabled::upgrade;

#[cfg(feature = "tls")]
mod enabled {
    use std::io::BufReader;
    use std::net::TcpStream;
    use std::path::Path;
    use std::sync::Arc;

    use mysqlc_core::{Error, Result};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

    use crate::config::{MySqlConfig, SslMode, TlsConfig};
    use crate::stream::Stream;

    fn tls_error(message: impl Into<String>) -> Error {
        Error::operational(
            crate::errmap::client_errors::CR_CONNECTION_ERROR,
            message.into(),
        )
    }

    /// Wrap an established TCP stream in TLS according to the config.
    pub(crate) fn upgrade(tcp: TcpStream, config: &MySqlConfig) -> Result<Stream> {
        let client_config = build_client_config(config)?;
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| tls_error(format!("invalid TLS server name '{}': {e}", config.host)))?;
        let conn = ClientConnection::new(Arc::new(client_config), server_name)
            .map_err(|e| tls_error(format!("TLS session setup failed: {e}")))?;
        tracing::debug!(host = %config.host, "upgraded connection to TLS");
        Ok(Stream::Tls(Box::new(StreamOwned::new(conn, tcp))))
    }

    fn build_client_config(config: &MySqlConfig) -> Result<ClientConfig> {
        let provider = crypto_provider(&config.tls)?;

        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_error(format!("TLS protocol setup failed: {e}")))?;

        // Required/Preferred encrypt without authenticating the server, the
        // same trade-off the C client makes below VERIFY_CA.
        let verify_peer = matches!(config.ssl_mode, SslMode::VerifyCa | SslMode::VerifyIdentity)
            && !config.tls.danger_skip_verify;

        let builder = if verify_peer {
            builder.with_root_certificates(root_store(&config.tls)?)
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::default()))
        };

        let client_config = match (&config.tls.cert, &config.tls.key) {
            (Some(cert), Some(key)) => {
                let certs = load_certs(cert)?;
                let key = load_key(key)?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| tls_error(format!("invalid client certificate: {e}")))?
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::programming(
                    "both ssl cert and ssl key must be set for client authentication",
                ));
            }
            (None, None) => builder.with_no_client_auth(),
        };

        Ok(client_config)
    }

    fn crypto_provider(tls: &TlsConfig) -> Result<rustls::crypto::CryptoProvider> {
        let mut provider = rustls::crypto::ring::default_provider();
        if let Some(names) = &tls.cipher {
            provider.cipher_suites.retain(|suite| {
                let name = format!("{:?}", suite.suite());
                names.iter().any(|n| n.eq_ignore_ascii_case(&name))
            });
            if provider.cipher_suites.is_empty() {
                return Err(Error::not_supported(format!(
                    "none of the requested cipher suites are available: {}",
                    names.join(", ")
                )));
            }
        }
        Ok(provider)
    }

    fn root_store(tls: &TlsConfig) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();

        if tls.ca.is_none() && tls.capath.is_none() {
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            return Ok(store);
        }

        if let Some(ca) = &tls.ca {
            for cert in load_certs(ca)? {
                store
                    .add(cert)
                    .map_err(|e| tls_error(format!("invalid CA certificate: {e}")))?;
            }
        }
        if let Some(dir) = &tls.capath {
            let entries = std::fs::read_dir(dir)
                .map_err(|e| tls_error(format!("cannot read CA directory: {e}")))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "pem") {
                    for cert in load_certs(&path)? {
                        store
                            .add(cert)
                            .map_err(|e| tls_error(format!("invalid CA certificate: {e}")))?;
                    }
                }
            }
        }
        if store.is_empty() {
            return Err(tls_error("no usable CA certificates found"));
        }
        Ok(store)
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
        let file = std::fs::File::open(path)
            .map_err(|e| tls_error(format!("cannot open {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);
        rustls_pemfile::certs(&mut reader)
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| tls_error(format!("cannot parse {}: {e}", path.display())))
    }

    fn load_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
        let file = std::fs::File::open(path)
            .map_err(|e| tls_error(format!("cannot open {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);
        rustls_pemfile::private_key(&mut reader)
            .map_err(|e| tls_error(format!("cannot parse {}: {e}", path.display())))?
            .ok_or_else(|| tls_error(format!("no private key found in {}", path.display())))
    }

    /// Certificate verifier that accepts any server certificate. Used for
    /// the encrypt-only SSL modes; signatures are still verified.
    #[derive(Debug)]
    struct AcceptAnyServerCert {
        provider: rustls::crypto::CryptoProvider,
    }

    impl Default for AcceptAnyServerCert {
        fn default() -> Self {
            Self {
                provider: rustls::crypto::ring::default_provider(),
            }
        }
    }

    impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error>
        {
            Ok(rustls::client::danger::ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error>
        {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error>
        {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
