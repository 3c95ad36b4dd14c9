//! HTTP transport for release checks and downloads
//!
//! [`ReleaseTransport`] is the seam between the update flow and the network.
//! [`UreqTransport`] is the production implementation; tests substitute a
//! scripted fake.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// TLS certificate verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Verify certificate chain and host name
    #[default]
    Strict,
    /// Accept invalid certificates and host names
    Relaxed,
}

/// Transport-level failure
#[derive(Debug, Error)]
pub enum TransportError {
    /// Certificate verification failed; a relaxed retry may succeed
    #[error("certificate verification failed: {0}")]
    Certificate(String),

    /// Server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection, timeout or read failure
    #[error("{0}")]
    Network(String),
}

/// An open download
pub struct DownloadStream {
    /// Length advertised by the server, if any
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

/// Network access used by the update flow
pub trait ReleaseTransport {
    /// Fetch a small JSON document
    fn fetch(&self, url: &str, tls: TlsMode, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Start streaming a release asset
    fn open_download(
        &self,
        url: &str,
        tls: TlsMode,
        timeout: Duration,
    ) -> Result<DownloadStream, TransportError>;
}

const GITHUB_JSON: &str = "application/vnd.github+json";
const OCTET_STREAM: &str = "application/octet-stream";

/// Release descriptors are small; anything larger is not a descriptor
const MAX_DESCRIPTOR_BYTES: u64 = 4 * 1024 * 1024;

/// Blocking HTTPS transport backed by ureq and native-tls
pub struct UreqTransport {
    user_agent: String,
}

impl UreqTransport {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    fn agent(&self, tls: TlsMode, timeout: Duration) -> Result<ureq::Agent, TransportError> {
        let mut builder = native_tls::TlsConnector::builder();
        if tls == TlsMode::Relaxed {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        let connector = builder
            .build()
            .map_err(|e| TransportError::Network(format!("TLS setup failed: {e}")))?;

        Ok(ureq::AgentBuilder::new()
            .tls_connector(Arc::new(connector))
            .timeout_connect(timeout.min(Duration::from_secs(30)))
            .timeout(timeout)
            .user_agent(&self.user_agent)
            .build())
    }
}

impl ReleaseTransport for UreqTransport {
    fn fetch(&self, url: &str, tls: TlsMode, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let resp = self
            .agent(tls, timeout)?
            .get(url)
            .set("Accept", GITHUB_JSON)
            .call()
            .map_err(classify)?;

        let mut body = Vec::new();
        resp.into_reader()
            .take(MAX_DESCRIPTOR_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| TransportError::Network(format!("reading response: {e}")))?;
        Ok(body)
    }

    fn open_download(
        &self,
        url: &str,
        tls: TlsMode,
        timeout: Duration,
    ) -> Result<DownloadStream, TransportError> {
        let resp = self
            .agent(tls, timeout)?
            .get(url)
            .set("Accept", OCTET_STREAM)
            .call()
            .map_err(classify)?;

        let content_length =
            advertised_length(resp.header("Content-Length"), resp.header("Content-Encoding"));

        Ok(DownloadStream {
            content_length,
            reader: Box::new(resp.into_reader()),
        })
    }
}

fn classify(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(code, _) => TransportError::Status(code),
        ureq::Error::Transport(transport) => {
            if is_certificate_error(&transport) {
                TransportError::Certificate(transport.to_string())
            } else {
                TransportError::Network(transport.to_string())
            }
        }
    }
}

/// Length of the decoded body, when the server states it
///
/// With a content coding the header counts encoded bytes, which say nothing
/// about the artifact on disk.
fn advertised_length(content_length: Option<&str>, content_encoding: Option<&str>) -> Option<u64> {
    match content_encoding.map(str::trim) {
        None | Some("") => {}
        Some(coding) if coding.eq_ignore_ascii_case("identity") => {}
        Some(_) => return None,
    }
    content_length.and_then(|v| v.trim().parse::<u64>().ok())
}

/// Markers of a failed certificate-chain verification
///
/// OpenSSL, SChannel and Security.framework messages. Other handshake
/// failures (protocol version, unexpected EOF) are plain network errors.
const CERTIFICATE_MARKERS: &[&str] = &[
    "certificate",
    "x509",
    "verify failed",
    "unknown ca",
    "self signed",
    "self-signed",
    "cert_",
    "sec_e_untrusted_root",
    "untrusted root",
    "not trusted",
];

/// Walk the source chain looking for a certificate verification failure
fn is_certificate_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_lowercase();
        if CERTIFICATE_MARKERS.iter().any(|marker| message.contains(marker)) {
            return true;
        }
        current = e.source();
    }
    false
}
