use super::parse::parse_leaf;
use super::verifier::{webpki_verifier, ChainVerdict, RecordingVerifier};
use anyhow::Context;
use async_trait::async_trait;
use certwatch_common::types::CertificateFacts;
use chrono::Utc;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a certificate could not be obtained. None of these are retried by the
/// fetcher itself; the host is simply checked again on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// DNS, TCP or TLS handshake failure, including the connect timeout.
    #[error("connect to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("{host} presented no certificate")]
    EmptyCertificate { host: String },

    #[error("leaf certificate from {host} could not be parsed: {reason}")]
    Parse { host: String, reason: String },
}

impl FetchError {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connect { .. } => "connect",
            FetchError::EmptyCertificate { .. } => "empty_certificate",
            FetchError::Parse { .. } => "parse",
        }
    }
}

/// Result of one successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedCertificate {
    pub facts: CertificateFacts,
    /// Reason the chain failed WebPKI verification, if it did.
    pub chain_error: Option<String>,
    pub chain_depth: usize,
    pub tls_version: Option<String>,
    pub cipher_suite: Option<String>,
}

/// Retrieves the leaf certificate a host presents.
#[async_trait]
pub trait CertFetcher: Send + Sync {
    async fn fetch(&self, host: &str) -> Result<FetchedCertificate, FetchError>;
}

/// Fetches certificates over a real TLS handshake.
pub struct TlsCertFetcher {
    port: u16,
    timeout: Duration,
    provider: Arc<CryptoProvider>,
    webpki: Arc<WebPkiServerVerifier>,
}

impl TlsCertFetcher {
    pub fn new(port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let webpki =
            webpki_verifier(provider.clone()).context("Failed to build WebPKI verifier")?;
        Ok(Self {
            port,
            timeout,
            provider,
            webpki,
        })
    }

    fn connect_error(&self, host: &str, reason: impl ToString) -> FetchError {
        FetchError::Connect {
            host: host.to_string(),
            port: self.port,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl CertFetcher for TlsCertFetcher {
    async fn fetch(&self, host: &str) -> Result<FetchedCertificate, FetchError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| self.connect_error(host, format!("invalid server name: {e}")))?;

        let verifier = Arc::new(RecordingVerifier::new(self.webpki.clone()));
        let config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| self.connect_error(host, e))?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let addr = format!("{host}:{}", self.port);
        let handshake = async {
            let tcp = TcpStream::connect(&addr)
                .await
                .map_err(|e| self.connect_error(host, format!("TCP connection failed: {e}")))?;
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| self.connect_error(host, format!("TLS handshake failed: {e}")))
        };
        let tls_stream = tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| {
                self.connect_error(
                    host,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })??;

        let (_, conn) = tls_stream.get_ref();
        let tls_version = conn.protocol_version().map(|v| format!("{v:?}"));
        let cipher_suite = conn
            .negotiated_cipher_suite()
            .map(|cs| format!("{:?}", cs.suite()));

        let certs = conn
            .peer_certificates()
            .filter(|certs| !certs.is_empty())
            .ok_or_else(|| FetchError::EmptyCertificate {
                host: host.to_string(),
            })?;

        let chain_error = match verifier.verdict() {
            Some(ChainVerdict::Valid) => None,
            Some(ChainVerdict::Invalid(reason)) => Some(reason),
            None => Some("chain was not verified".to_string()),
        };

        let facts = parse_leaf(host, certs[0].as_ref(), chain_error.is_none(), Utc::now())
            .map_err(|reason| FetchError::Parse {
                host: host.to_string(),
                reason,
            })?;

        tracing::debug!(
            host = %host,
            tls_version = ?tls_version,
            cipher_suite = ?cipher_suite,
            chain_depth = certs.len(),
            chain_valid = facts.chain_valid,
            "Certificate fetched"
        );
        if let Some(reason) = &chain_error {
            tracing::info!(host = %host, reason = %reason, "Certificate chain did not verify");
        }

        Ok(FetchedCertificate {
            facts,
            chain_error,
            chain_depth: certs.len(),
            tls_version,
            cipher_suite,
        })
    }
}
