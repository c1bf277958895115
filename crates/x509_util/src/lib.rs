// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Verification of three-certificate X.509 chains (leaf, intermediate, root)
//! against a fixed set of trust anchors, with optional OCSP revocation checks.
//!
//! The issuer's certificate profile carries private marker extensions and is
//! validated by hand rather than through a general path builder. See
//! [`ChainVerifier::verify_chain`] for the exact sequence of checks.

pub mod certificate;
pub mod ocsp;
pub mod time;
pub mod transport;

use const_oid::{db::rfc5280::ID_AD_OCSP, ObjectIdentifier};
use certificate::ParsedCertificate;
use der::{pem::LineEnding, EncodePem, Error as DerError};
use log::{debug, warn};
use ocsp::{OcspError, RevocationStatus};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, fmt, sync::Arc};
use time::WindowPosition;
use transport::{HttpOcspTransport, OcspTransport};
use x509_cert::{
    ext::pkix::{name::GeneralName, AuthorityInfoAccessSyntax, BasicConstraints},
    Certificate,
};

/// Unix timestamp, measured since the epoch (January 1, 1970, 00:00),
/// ignoring leap seconds, in seconds.
pub type UnixTimestamp = u64;

/// Number of certificates in every chain: leaf, intermediate, root.
pub const CHAIN_LENGTH: usize = 3;

/// Extension that must be present on the signing leaf.
pub const LEAF_MARKER_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113635.100.6.11.1");

/// Extension that must be present on the intermediate.
pub const INTERMEDIATE_MARKER_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113635.100.6.2.1");

/// Position of a certificate in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertRole {
    Leaf,
    Intermediate,
    Root,
}

impl CertRole {
    const ALL: [CertRole; CHAIN_LENGTH] = [Self::Leaf, Self::Intermediate, Self::Root];
}

impl fmt::Display for CertRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Leaf => "leaf",
            Self::Intermediate => "intermediate",
            Self::Root => "root",
        })
    }
}

/// Coarse classification of a [`ChainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorKind {
    /// Undecodable certificate bytes or no trust anchors at all.
    InvalidCertificate,
    /// Carries the number of certificates received.
    InvalidChainLength(usize),
    /// The certificates do not form a chain to a trust anchor.
    InvalidChain,
    VerificationFailure,
    /// Revocation status could not be determined; retrying later may help.
    RetryableVerificationFailure,
}

#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    #[error("expected {CHAIN_LENGTH} certificates, got {0}")]
    InvalidChainLength(usize),
    #[error("no trust anchors configured")]
    NoTrustAnchors,
    #[error("invalid trust anchor at index {index}: {source}")]
    InvalidTrustAnchor { index: usize, source: DerError },
    #[error("invalid {role} certificate: {source}")]
    InvalidCertificate { role: CertRole, source: DerError },
    #[error("root certificate is not in trusted roots")]
    UntrustedRoot,
    #[error("signature verification failed for {0} certificate")]
    InvalidSignature(CertRole),
    #[error("{0} certificate is not yet valid")]
    NotYetValid(CertRole),
    #[error("{0} certificate has expired")]
    Expired(CertRole),
    #[error("{0} certificate issuer does not match the next certificate's subject")]
    IssuerMismatch(CertRole),
    #[error("{0} certificate has invalid basic constraints")]
    InvalidBasicConstraints(CertRole),
    #[error("{0} certificate is missing required OID {1}")]
    MissingRequiredOid(CertRole, ObjectIdentifier),
    #[error("{0} certificate has been revoked")]
    Revoked(CertRole),
    #[error("revocation status of {0} certificate is unknown")]
    RevocationUnknown(CertRole),
    #[error("OCSP check for {role} certificate failed: {source}")]
    Ocsp { role: CertRole, source: OcspError },
    #[error(transparent)]
    Der(#[from] DerError),
}

impl ChainError {
    pub fn kind(&self) -> ChainErrorKind {
        match self {
            Self::InvalidChainLength(len) => ChainErrorKind::InvalidChainLength(*len),
            Self::NoTrustAnchors
            | Self::InvalidTrustAnchor { .. }
            | Self::InvalidCertificate { .. } => ChainErrorKind::InvalidCertificate,
            Self::UntrustedRoot
            | Self::InvalidSignature(_)
            | Self::IssuerMismatch(_)
            | Self::InvalidBasicConstraints(_) => ChainErrorKind::InvalidChain,
            Self::NotYetValid(_)
            | Self::Expired(_)
            | Self::MissingRequiredOid(..)
            | Self::Revoked(_)
            | Self::Der(_) => ChainErrorKind::VerificationFailure,
            Self::RevocationUnknown(_) => ChainErrorKind::RetryableVerificationFailure,
            Self::Ocsp { source, .. } => {
                if source.is_retryable() {
                    ChainErrorKind::RetryableVerificationFailure
                } else {
                    ChainErrorKind::VerificationFailure
                }
            }
        }
    }
}

/// The set of DER root certificates a chain may end in. Membership is
/// byte-for-byte equality.
#[derive(Default, Clone)]
pub struct TrustAnchors {
    // Map from SHA256 fingerprint to DER.
    by_fingerprint: HashMap<[u8; 32], Vec<u8>>,
}

impl TrustAnchors {
    /// Constructs a `TrustAnchors` from DER certificates, weeding out
    /// duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if any anchor does not parse as a certificate.
    pub fn new(anchors: Vec<Vec<u8>>) -> Result<Self, ChainError> {
        let mut by_fingerprint = HashMap::with_capacity(anchors.len());
        for (index, der) in anchors.into_iter().enumerate() {
            ParsedCertificate::from_der(&der)
                .map_err(|source| ChainError::InvalidTrustAnchor { index, source })?;
            by_fingerprint.insert(Sha256::digest(&der).into(), der);
        }
        Ok(Self { by_fingerprint })
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }

    /// Check if the set includes a certificate.
    pub fn includes(&self, der: &[u8]) -> bool {
        self.by_fingerprint
            .get::<[u8; 32]>(&Sha256::digest(der).into())
            .is_some_and(|anchor| anchor == der)
    }
}

/// Identifies the trust policy of a [`ChainVerifier`].
pub type PolicyDigest = [u8; 32];

/// Verifies chains and extracts the leaf's public key.
pub struct ChainVerifier {
    anchors: TrustAnchors,
    enable_strict_checks: bool,
    transport: Arc<dyn OcspTransport>,
}

impl ChainVerifier {
    /// A verifier that queries OCSP responders over HTTP with the default
    /// timeout. When `enable_strict_checks` is false the marker extension
    /// checks are skipped.
    pub fn new(anchors: TrustAnchors, enable_strict_checks: bool) -> Self {
        Self {
            anchors,
            enable_strict_checks,
            transport: Arc::new(HttpOcspTransport::default()),
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn OcspTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// SHA-256 over the sorted trust anchor fingerprints and the strictness
    /// flag. Verifiers with the same anchors and strictness share a digest.
    pub fn policy_digest(&self) -> PolicyDigest {
        let mut fingerprints: Vec<_> = self.anchors.by_fingerprint.keys().collect();
        fingerprints.sort_unstable();
        let mut hasher = Sha256::new();
        for fingerprint in fingerprints {
            hasher.update(fingerprint);
        }
        hasher.update([u8::from(self.enable_strict_checks)]);
        hasher.finalize().into()
    }

    /// Verifies `chain`, ordered leaf first, as of `effective_date` and
    /// returns the leaf's public key as a PEM `PUBLIC KEY` block.
    ///
    /// The checks run in this order and stop at the first failure:
    ///
    /// 1. The chain has exactly three certificates, trust anchors are
    ///    configured, and every certificate decodes.
    /// 2. The root is byte-equal to a trust anchor.
    /// 3. The root signs the intermediate and the intermediate signs the leaf.
    /// 4. `effective_date` is inside every certificate's validity period,
    ///    widened by [`time::CLOCK_SKEW_SECS`] on both ends.
    /// 5. Each issuer name equals the next certificate's subject.
    /// 6. The intermediate is a CA and the leaf is not.
    /// 7. With strict checks, the leaf and intermediate carry their marker
    ///    extensions.
    /// 8. With `perform_online_checks`, neither the intermediate nor the leaf
    ///    is revoked according to the OCSP responders named in their
    ///    Authority Information Access extension. A certificate naming no
    ///    responder passes.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] describing the first failed check.
    pub fn verify_chain(
        &self,
        chain: &[Vec<u8>],
        perform_online_checks: bool,
        effective_date: UnixTimestamp,
    ) -> Result<String, ChainError> {
        if chain.len() != CHAIN_LENGTH {
            return Err(ChainError::InvalidChainLength(chain.len()));
        }
        if self.anchors.is_empty() {
            return Err(ChainError::NoTrustAnchors);
        }
        let certs = chain
            .iter()
            .zip(CertRole::ALL)
            .map(|(der, role)| {
                ParsedCertificate::from_der(der)
                    .map_err(|source| ChainError::InvalidCertificate { role, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (leaf, intermediate, root) = (&certs[0], &certs[1], &certs[2]);

        if !self.anchors.includes(&chain[2]) {
            return Err(ChainError::UntrustedRoot);
        }

        if !intermediate.is_signed_by(&root.cert) {
            return Err(ChainError::InvalidSignature(CertRole::Intermediate));
        }
        if !leaf.is_signed_by(&intermediate.cert) {
            return Err(ChainError::InvalidSignature(CertRole::Leaf));
        }

        for (cert, role) in certs.iter().zip(CertRole::ALL) {
            match cert.validity_position(effective_date) {
                WindowPosition::Before => return Err(ChainError::NotYetValid(role)),
                WindowPosition::After => return Err(ChainError::Expired(role)),
                WindowPosition::Within => {}
            }
        }

        let (leaf, intermediate, root) = (&leaf.cert, &intermediate.cert, &root.cert);
        if intermediate.tbs_certificate.issuer != root.tbs_certificate.subject {
            return Err(ChainError::IssuerMismatch(CertRole::Intermediate));
        }
        if leaf.tbs_certificate.issuer != intermediate.tbs_certificate.subject {
            return Err(ChainError::IssuerMismatch(CertRole::Leaf));
        }

        if !is_ca(intermediate, CertRole::Intermediate)? {
            return Err(ChainError::InvalidBasicConstraints(CertRole::Intermediate));
        }
        if is_ca(leaf, CertRole::Leaf)? {
            return Err(ChainError::InvalidBasicConstraints(CertRole::Leaf));
        }

        if self.enable_strict_checks {
            require_extension(leaf, CertRole::Leaf, LEAF_MARKER_OID)?;
            require_extension(intermediate, CertRole::Intermediate, INTERMEDIATE_MARKER_OID)?;
        }

        if perform_online_checks {
            self.check_revocation(intermediate, root, CertRole::Intermediate, effective_date)?;
            self.check_revocation(leaf, intermediate, CertRole::Leaf, effective_date)?;
        }

        Ok(leaf
            .tbs_certificate
            .subject_public_key_info
            .to_pem(LineEnding::LF)?)
    }

    /// Asks each OCSP responder named by `cert` in turn until one gives a
    /// definite answer.
    fn check_revocation(
        &self,
        cert: &Certificate,
        issuer: &Certificate,
        role: CertRole,
        at: UnixTimestamp,
    ) -> Result<(), ChainError> {
        let urls =
            ocsp_urls(cert).map_err(|source| ChainError::InvalidCertificate { role, source })?;
        if urls.is_empty() {
            debug!("{role} certificate names no OCSP responder; skipping revocation check");
            return Ok(());
        }
        let (cert_id, request) =
            ocsp::build_request(cert, issuer).map_err(|source| ChainError::Ocsp { role, source })?;

        let mut last_error = None;
        for url in &urls {
            let outcome = self
                .transport
                .post(url, &request)
                .map_err(OcspError::from)
                .and_then(|response| ocsp::check_response(&response, &cert_id, issuer, at));
            match outcome {
                Ok(RevocationStatus::Good) => return Ok(()),
                Ok(RevocationStatus::Revoked { revoked_at, reason }) => {
                    warn!("{role} certificate revoked at {revoked_at} ({reason:?}) per {url}");
                    return Err(ChainError::Revoked(role));
                }
                Ok(RevocationStatus::Unknown) => {
                    warn!("{url} does not know the {role} certificate");
                    return Err(ChainError::RevocationUnknown(role));
                }
                Err(e) => {
                    warn!("OCSP check of {role} certificate against {url} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(Ok(()), |source| Err(ChainError::Ocsp { role, source }))
    }
}

/// Returns the OCSP responder URLs from the Authority Information Access
/// extension, in the order listed.
fn ocsp_urls(cert: &Certificate) -> Result<Vec<String>, DerError> {
    let Some((_, aia)) = cert.tbs_certificate.get::<AuthorityInfoAccessSyntax>()? else {
        return Ok(Vec::new());
    };
    Ok(aia
        .0
        .iter()
        .filter(|description| description.access_method == ID_AD_OCSP)
        .filter_map(|description| match &description.access_location {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.as_str().to_owned()),
            _ => None,
        })
        .collect())
}

/// Returns whether the issuer's key verifies the signature on `child`.
pub(crate) fn is_link_valid(child: &Certificate, issuer: &Certificate) -> bool {
    der::Encode::to_der(&child.tbs_certificate)
        .is_ok_and(|tbs| certificate::verify_signed_by(&tbs, child, issuer))
}

/// Whether the certificate asserts `cA`. A missing extension means no.
fn is_ca(cert: &Certificate, role: CertRole) -> Result<bool, ChainError> {
    Ok(cert
        .tbs_certificate
        .get::<BasicConstraints>()
        .map_err(|_| ChainError::InvalidBasicConstraints(role))?
        .is_some_and(|(_, bc)| bc.ca))
}

fn require_extension(
    cert: &Certificate,
    role: CertRole,
    oid: ObjectIdentifier,
) -> Result<(), ChainError> {
    if cert
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .any(|ext| ext.extn_id == oid)
    {
        Ok(())
    } else {
        Err(ChainError::MissingRequiredOid(role, oid))
    }
}

/// Parses PEM input into DER certificates. Skips over non certificate blocks.
///
/// # Errors
///
/// Returns an error if a certificate block cannot be decoded.
pub fn certs_from_pem(input: &[u8]) -> Result<Vec<Vec<u8>>, DerError> {
    const BEGIN: &[u8] = b"-----BEGIN CERTIFICATE-----";
    const END: &[u8] = b"-----END CERTIFICATE-----";

    let mut certs = Vec::new();
    let mut rest = input;
    while let Some(start) = find(rest, BEGIN) {
        let block = &rest[start..];
        let end = find(block, END).map_or(block.len(), |end| end + END.len());
        let (_, der) = der::pem::decode_vec(&block[..end])?;
        ParsedCertificate::from_der(&der)?;
        certs.push(der);
        rest = &block[end..];
    }
    Ok(certs)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Builds a DER certificate chain from the given PEM files.
#[macro_export]
macro_rules! build_chain {
    ($($file:expr),+) => {{
        let mut chain: Vec<Vec<u8>> = Vec::new();
        $(
            chain.extend($crate::certs_from_pem(include_bytes!($file)).expect("failed to parse PEM file"));
        )*
        chain
    }}
}
