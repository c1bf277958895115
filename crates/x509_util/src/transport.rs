// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Delivery of OCSP requests to responders.

use crate::ocsp::OCSP_REQUEST_CONTENT_TYPE;
use std::time::Duration;
use url::Url;

/// Default time allowed for a single OCSP round trip.
pub const DEFAULT_OCSP_TIMEOUT: Duration = Duration::from_secs(30);

// Responses are a few kilobytes at most.
const MAX_RESPONSE_SIZE: u64 = 1 << 20;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("invalid OCSP responder URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported OCSP responder URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("OCSP request failed: {0}")]
    Http(#[from] ureq::Error),
}

/// Sends a DER-encoded OCSP request to a responder and returns the raw
/// response body.
pub trait OcspTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the responder cannot be reached, times out, or
    /// answers with a non-success HTTP status.
    fn post(&self, url: &str, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Blocking HTTP transport with a global per-request timeout.
pub struct HttpOcspTransport {
    agent: ureq::Agent,
}

impl HttpOcspTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for HttpOcspTransport {
    fn default() -> Self {
        Self::new(DEFAULT_OCSP_TIMEOUT)
    }
}

impl OcspTransport for HttpOcspTransport {
    fn post(&self, url: &str, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }
        let response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", OCSP_REQUEST_CONTENT_TYPE)
            .send(request)?;
        let mut body = response.into_body();
        Ok(body.with_config().limit(MAX_RESPONSE_SIZE).read_to_vec()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_urls() {
        let transport = HttpOcspTransport::default();
        assert!(matches!(
            transport.post("not a url", b"").unwrap_err(),
            TransportError::InvalidUrl(_)
        ));
        assert!(matches!(
            transport.post("ldap://ocsp.example.test/", b"").unwrap_err(),
            TransportError::UnsupportedScheme(scheme) if scheme == "ldap"
        ));
    }
}
