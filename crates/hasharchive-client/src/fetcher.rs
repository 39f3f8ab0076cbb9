use std::error::Error as StdError;
use std::net::IpAddr;
use std::time::Duration;

use hasharchive_core::{AppError, FetchError, FetchedResponse, Fetcher};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use url::Url;

use crate::hasher::MultiHasher;

const USER_AGENT: &str = concat!("hasharchive/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher using reqwest.
///
/// Streams the body through a [`MultiHasher`] without buffering it. Redirects
/// are not followed; a 3xx response is archived like any other. By default,
/// SSRF protection is **enabled**: requests to private/reserved IP ranges are
/// blocked. Use [`allow_private_urls`](Self::allow_private_urls) to disable
/// this (e.g., for CLI usage where the user controls the machine).
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    ssrf_protection: bool,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    ///
    /// Only use this for CLI usage where the user controls the machine.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

impl Fetcher for HttpFetcher {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, client: &str) -> Result<FetchedResponse, FetchError> {
        if self.ssrf_protection {
            validate_url(url).await?;
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let expected = response.content_length();

        let mut hasher = MultiHasher::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(&e))? {
            hasher.update(&chunk);
        }

        let length = hasher.length();
        if expected.is_some_and(|expected| length < expected) {
            tracing::debug!(%url, length, ?expected, "Body shorter than Content-Length");
            return Err(FetchError::Truncated);
        }

        tracing::debug!(%url, status, length, "Fetched");
        Ok(FetchedResponse {
            status,
            content_type,
            length,
            digests: hasher.finish(),
        })
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map a reqwest failure onto the persisted failure taxonomy.
fn classify(error: &reqwest::Error) -> FetchError {
    let messages = error_chain(error);

    if let Some(cert) = classify_certificate(&messages) {
        return cert;
    }
    if error.is_timeout() {
        return FetchError::TimedOut;
    }
    if error.is_redirect() {
        return FetchError::Redirect;
    }
    if error.is_body() || error.is_decode() {
        return FetchError::Truncated;
    }
    if error.is_connect() {
        if messages.contains("dns error") || messages.contains("failed to lookup address") {
            return FetchError::NotFound;
        }
        return FetchError::ConnRefused;
    }
    FetchError::Unknown
}

/// The error and all its sources, lowercased and joined.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut messages = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        messages.push_str(": ");
        messages.push_str(&inner.to_string());
        source = inner.source();
    }
    messages.to_lowercase()
}

/// Verifier messages (OpenSSL wording) and the failure they mean.
///
/// More specific phrases come before the phrases they contain.
const CERT_MESSAGES: &[(&str, FetchError)] = &[
    ("self signed certificate in certificate chain", FetchError::SelfSignedCertInChain),
    ("self-signed certificate in certificate chain", FetchError::SelfSignedCertInChain),
    ("self signed certificate", FetchError::DepthZeroSelfSignedCert),
    ("self-signed certificate", FetchError::DepthZeroSelfSignedCert),
    ("unable to get local issuer certificate", FetchError::UnableToGetIssuerCertLocally),
    ("unable to get issuer certificate", FetchError::UnableToGetIssuerCert),
    ("unable to get certificate crl", FetchError::UnableToGetCrl),
    ("unable to decrypt certificate's signature", FetchError::UnableToDecryptCertSignature),
    ("unable to decrypt crl's signature", FetchError::UnableToDecryptCrlSignature),
    ("unable to decode issuer public key", FetchError::UnableToDecodeIssuerPublicKey),
    ("unable to verify the first certificate", FetchError::UnableToVerifyLeafSignature),
    ("certificate signature failure", FetchError::CertSignatureFailure),
    ("crl signature failure", FetchError::CrlSignatureFailure),
    ("certificate is not yet valid", FetchError::CertNotYetValid),
    ("crl is not yet valid", FetchError::CrlNotYetValid),
    ("certificate has expired", FetchError::CertHasExpired),
    ("crl has expired", FetchError::CrlHasExpired),
    ("format error in certificate's notbefore field", FetchError::ErrorInCertNotBeforeField),
    ("format error in certificate's notafter field", FetchError::ErrorInCertNotAfterField),
    ("format error in crl's lastupdate field", FetchError::ErrorInCrlLastUpdateField),
    ("format error in crl's nextupdate field", FetchError::ErrorInCrlNextUpdateField),
    ("out of memory", FetchError::OutOfMem),
    ("certificate chain too long", FetchError::CertChainTooLong),
    ("certificate revoked", FetchError::CertRevoked),
    ("invalid ca certificate", FetchError::InvalidCa),
    ("path length constraint exceeded", FetchError::PathLengthExceeded),
    ("unsupported certificate purpose", FetchError::InvalidPurpose),
    ("certificate not trusted", FetchError::CertUntrusted),
    ("certificate rejected", FetchError::CertRejected),
];

fn classify_certificate(messages: &str) -> Option<FetchError> {
    if !messages.contains("certificate") && !messages.contains("crl") {
        return None;
    }
    let cert = CERT_MESSAGES
        .iter()
        .find(|(phrase, _)| messages.contains(phrase))
        .map(|(_, kind)| *kind);
    // A verification failure we cannot name is still a certificate failure.
    cert.or_else(|| messages.contains("certificate verify failed").then_some(FetchError::CertRejected))
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Validate a URL to prevent server-side request forgery (SSRF).
///
/// 1. Only allow `http` and `https` schemes.
/// 2. Resolve the hostname via DNS.
/// 3. Reject if any resolved IP is private/reserved.
async fn validate_url(url: &str) -> Result<(), FetchError> {
    let parsed = Url::parse(url).map_err(|e| {
        tracing::debug!(%url, error = %e, "Unparseable URL");
        FetchError::Blocked
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            tracing::debug!(%url, %scheme, "Scheme not allowed");
            return Err(FetchError::Blocked);
        }
    }

    let host = parsed.host_str().ok_or(FetchError::Blocked)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(ip) {
            tracing::debug!(%url, %ip, "SSRF blocked");
            return Err(FetchError::Blocked);
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| FetchError::NotFound)?
        .collect();

    if addrs.is_empty() {
        return Err(FetchError::NotFound);
    }

    for socket_addr in &addrs {
        if is_private_ip(socket_addr.ip()) {
            tracing::debug!(%url, ip = %socket_addr.ip(), "SSRF blocked");
            return Err(FetchError::Blocked);
        }
    }

    Ok(())
}

/// Check if an IP address is in a private/reserved/link-local range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()           // 127.0.0.0/8
                || v4.is_private()     // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local()  // 169.254.0.0/16 (cloud metadata!)
                || v4.is_unspecified() // 0.0.0.0
                || v4.is_broadcast()   // 255.255.255.255
                || v4.is_documentation() // 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGN)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()       // ::1
                || v6.is_unspecified() // ::
                // fe80::/10 (link-local)
                || (v6.segments()[0] & 0xFFC0) == 0xFE80
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xFE00) == 0xFC00
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
