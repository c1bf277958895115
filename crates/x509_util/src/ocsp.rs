// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! OCSP request construction and response validation per
//! [RFC 6960](https://datatracker.ietf.org/doc/html/rfc6960).
//!
//! Only the subset needed to ask "is this certificate revoked?" is modeled:
//! unsigned requests without extensions, and basic responses signed with
//! ECDSA over P-256 or P-384.

use crate::{
    time::{generalized_to_unix, to_epoch, validity_position, window_position, WindowPosition},
    transport::TransportError,
    UnixTimestamp,
};
use const_oid::{
    db::{rfc5280, rfc5912, rfc6960},
    ObjectIdentifier,
};
use der::{
    asn1::{BitString, GeneralizedTime, Null, OctetString},
    Any, Choice, Decode, Encode, Enumerated, Sequence,
};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};
use signature::hazmat::PrehashVerifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned, SubjectPublicKeyInfoRef};
use x509_cert::{
    ext::{
        pkix::{CrlReason, ExtendedKeyUsage},
        Extensions,
    },
    name::Name,
    serial_number::SerialNumber,
    Certificate,
};

/// Media type of a DER-encoded `OCSPRequest`.
pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";

#[derive(thiserror::Error, Debug)]
pub enum OcspError {
    #[error("failed to encode OCSP request: {0}")]
    Request(der::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed OCSP response: {0}")]
    Malformed(der::Error),
    #[error("OCSP responder returned status {0:?}")]
    Unsuccessful(OcspResponseStatus),
    #[error("successful OCSP response carries no response bytes")]
    NoResponseBytes,
    #[error("unsupported OCSP response type {0}")]
    UnsupportedResponseType(ObjectIdentifier),
    #[error("OCSP response not signed by an authorized responder")]
    UnauthorizedResponder,
    #[error("unsupported OCSP signature algorithm {0}")]
    UnsupportedSignatureAlgorithm(ObjectIdentifier),
    #[error("OCSP response signature is invalid")]
    InvalidSignature,
    #[error("OCSP response has no status for the requested certificate")]
    MissingResponse,
    #[error("OCSP response is not current")]
    Stale,
}

impl OcspError {
    /// Whether the failure says nothing definite about the certificate, so
    /// asking again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Malformed(_)
                | Self::Unsuccessful(_)
                | Self::NoResponseBytes
                | Self::UnsupportedResponseType(_)
                | Self::MissingResponse
                | Self::Stale
        )
    }
}

/// ```text
/// Version ::= INTEGER { v1(0) }
/// ```
#[derive(Clone, Debug, Copy, PartialEq, Eq, Enumerated, Default)]
#[asn1(type = "INTEGER")]
#[repr(u8)]
pub enum OcspVersion {
    #[default]
    V1 = 0,
}

/// ```text
/// CertID ::= SEQUENCE {
///     hashAlgorithm       AlgorithmIdentifier,
///     issuerNameHash      OCTET STRING,
///     issuerKeyHash       OCTET STRING,
///     serialNumber        CertificateSerialNumber }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: SerialNumber,
}

impl CertId {
    /// Builds the SHA-1 `CertID` naming `cert` as issued by `issuer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer's name cannot be DER-encoded.
    pub fn new(cert: &Certificate, issuer: &Certificate) -> Result<Self, der::Error> {
        let issuer_tbs = &issuer.tbs_certificate;
        Ok(Self {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: rfc5912::ID_SHA_1,
                parameters: Some(Any::null()),
            },
            issuer_name_hash: OctetString::new(Sha1::digest(issuer_tbs.subject.to_der()?).to_vec())?,
            issuer_key_hash: OctetString::new(key_hash(&issuer_tbs.subject_public_key_info).to_vec())?,
            serial_number: cert.tbs_certificate.serial_number.clone(),
        })
    }

    /// Responders may omit or include NULL hash parameters, so only the
    /// algorithm, the hashes and the serial are compared.
    fn matches(&self, other: &CertId) -> bool {
        self.hash_algorithm.oid == other.hash_algorithm.oid
            && self.issuer_name_hash == other.issuer_name_hash
            && self.issuer_key_hash == other.issuer_key_hash
            && self.serial_number == other.serial_number
    }
}

/// ```text
/// OCSPRequest ::= SEQUENCE {
///     tbsRequest                  TBSRequest,
///     optionalSignature   [0]     EXPLICIT Signature OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspRequest {
    pub tbs_request: TbsRequest,
}

/// ```text
/// TBSRequest ::= SEQUENCE {
///     version             [0]     EXPLICIT Version DEFAULT v1,
///     requestorName       [1]     EXPLICIT GeneralName OPTIONAL,
///     requestList                 SEQUENCE OF Request,
///     requestExtensions   [2]     EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TbsRequest {
    #[asn1(context_specific = "0", default = "Default::default")]
    pub version: OcspVersion,
    pub request_list: Vec<Request>,
    #[asn1(context_specific = "2", optional = "true")]
    pub request_extensions: Option<Extensions>,
}

/// ```text
/// Request ::= SEQUENCE {
///     reqCert                     CertID,
///     singleRequestExtensions     [0] EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Request {
    pub req_cert: CertId,
    #[asn1(context_specific = "0", optional = "true")]
    pub single_request_extensions: Option<Extensions>,
}

impl OcspRequest {
    /// A request for the status of a single certificate.
    pub fn single(cert_id: CertId) -> Self {
        Self {
            tbs_request: TbsRequest {
                version: OcspVersion::V1,
                request_list: vec![Request {
                    req_cert: cert_id,
                    single_request_extensions: None,
                }],
                request_extensions: None,
            },
        }
    }
}

/// ```text
/// OCSPResponseStatus ::= ENUMERATED { ... }
/// ```
#[derive(Clone, Debug, Copy, PartialEq, Eq, Enumerated)]
#[repr(u8)]
pub enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

/// ```text
/// OCSPResponse ::= SEQUENCE {
///     responseStatus         OCSPResponseStatus,
///     responseBytes          [0] EXPLICIT ResponseBytes OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspResponse {
    pub response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", optional = "true")]
    pub response_bytes: Option<ResponseBytes>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseBytes {
    pub response_type: ObjectIdentifier,
    pub response: OctetString,
}

/// ```text
/// BasicOCSPResponse ::= SEQUENCE {
///     tbsResponseData      ResponseData,
///     signatureAlgorithm   AlgorithmIdentifier,
///     signature            BIT STRING,
///     certs            [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct BasicOcspResponse {
    pub tbs_response_data: ResponseData,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: BitString,
    #[asn1(context_specific = "0", optional = "true")]
    pub certs: Option<Vec<Certificate>>,
}

/// ```text
/// ResponseData ::= SEQUENCE {
///     version              [0] EXPLICIT Version DEFAULT v1,
///     responderID              ResponderID,
///     producedAt               GeneralizedTime,
///     responses                SEQUENCE OF SingleResponse,
///     responseExtensions   [1] EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseData {
    #[asn1(context_specific = "0", default = "Default::default")]
    pub version: OcspVersion,
    pub responder_id: ResponderId,
    pub produced_at: GeneralizedTime,
    pub responses: Vec<SingleResponse>,
    #[asn1(context_specific = "1", optional = "true")]
    pub response_extensions: Option<Extensions>,
}

/// ```text
/// ResponderID ::= CHOICE {
///     byName   [1] Name,
///     byKey    [2] KeyHash }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum ResponderId {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    ByName(Name),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    ByKey(OctetString),
}

/// ```text
/// SingleResponse ::= SEQUENCE {
///     certID                       CertID,
///     certStatus                   CertStatus,
///     thisUpdate                   GeneralizedTime,
///     nextUpdate         [0]       EXPLICIT GeneralizedTime OPTIONAL,
///     singleExtensions   [1]       EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub cert_status: CertStatus,
    pub this_update: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    pub next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", optional = "true")]
    pub single_extensions: Option<Extensions>,
}

/// ```text
/// CertStatus ::= CHOICE {
///     good        [0]     IMPLICIT NULL,
///     revoked     [1]     IMPLICIT RevokedInfo,
///     unknown     [2]     IMPLICIT UnknownInfo }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum CertStatus {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RevokedInfo {
    pub revocation_time: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    pub revocation_reason: Option<CrlReason>,
}

/// The outcome of a validated OCSP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevocationStatus {
    Good,
    Revoked {
        revoked_at: UnixTimestamp,
        reason: Option<CrlReason>,
    },
    Unknown,
}

/// SHA-1 over the raw subject public key bits, as used by `CertID` and
/// `ResponderID.byKey`.
fn key_hash(spki: &SubjectPublicKeyInfoOwned) -> [u8; 20] {
    Sha1::digest(spki.subject_public_key.raw_bytes()).into()
}

/// Builds a DER-encoded request for the status of `cert`.
///
/// # Errors
///
/// Returns an error if the request cannot be DER-encoded.
pub fn build_request(cert: &Certificate, issuer: &Certificate) -> Result<(CertId, Vec<u8>), OcspError> {
    let cert_id = CertId::new(cert, issuer).map_err(OcspError::Request)?;
    let request = OcspRequest::single(cert_id.clone())
        .to_der()
        .map_err(OcspError::Request)?;
    Ok((cert_id, request))
}

/// Validates a DER-encoded `OCSPResponse` for the certificate named by
/// `cert_id`, issued by `issuer`, as of `at`.
///
/// # Errors
///
/// Returns an error if the response is malformed, unsuccessful, signed by
/// anyone other than the issuer or its delegated responder, carries no
/// status for `cert_id`, or is not current at `at`.
pub fn check_response(
    response_der: &[u8],
    cert_id: &CertId,
    issuer: &Certificate,
    at: UnixTimestamp,
) -> Result<RevocationStatus, OcspError> {
    let response = OcspResponse::from_der(response_der).map_err(OcspError::Malformed)?;
    if response.response_status != OcspResponseStatus::Successful {
        return Err(OcspError::Unsuccessful(response.response_status));
    }
    let bytes = response.response_bytes.ok_or(OcspError::NoResponseBytes)?;
    if bytes.response_type != rfc6960::ID_PKIX_OCSP_BASIC {
        return Err(OcspError::UnsupportedResponseType(bytes.response_type));
    }
    let basic =
        BasicOcspResponse::from_der(bytes.response.as_bytes()).map_err(OcspError::Malformed)?;

    let signer = find_signer(&basic, issuer, at)?;
    let tbs = basic
        .tbs_response_data
        .to_der()
        .map_err(OcspError::Malformed)?;
    verify_signature(
        &signer.tbs_certificate.subject_public_key_info,
        &basic.signature_algorithm.oid,
        &tbs,
        basic.signature.raw_bytes(),
    )?;

    let single = basic
        .tbs_response_data
        .responses
        .iter()
        .find(|single| single.cert_id.matches(cert_id))
        .ok_or(OcspError::MissingResponse)?;

    // thisUpdate must not be in the future and nextUpdate, when present,
    // must not have passed.
    let this_update = to_epoch(generalized_to_unix(&single.this_update));
    let next_update = single
        .next_update
        .as_ref()
        .map(|next| to_epoch(generalized_to_unix(next)));
    if window_position(to_epoch(at), this_update, next_update) != WindowPosition::Within {
        return Err(OcspError::Stale);
    }

    Ok(match &single.cert_status {
        CertStatus::Good(_) => RevocationStatus::Good,
        CertStatus::Revoked(info) => RevocationStatus::Revoked {
            revoked_at: generalized_to_unix(&info.revocation_time),
            reason: info.revocation_reason,
        },
        CertStatus::Unknown(_) => RevocationStatus::Unknown,
    })
}

/// Identifies the certificate whose key signed the response: either the
/// issuer itself, or a responder certificate included in the response that
/// the issuer delegated OCSP signing to.
fn find_signer<'a>(
    basic: &'a BasicOcspResponse,
    issuer: &'a Certificate,
    at: UnixTimestamp,
) -> Result<&'a Certificate, OcspError> {
    let responder_id = &basic.tbs_response_data.responder_id;
    if responder_matches(responder_id, issuer) {
        return Ok(issuer);
    }
    basic
        .certs
        .iter()
        .flatten()
        .find(|candidate| {
            responder_matches(responder_id, candidate) && is_delegated_responder(candidate, issuer, at)
        })
        .ok_or(OcspError::UnauthorizedResponder)
}

fn responder_matches(responder_id: &ResponderId, cert: &Certificate) -> bool {
    match responder_id {
        ResponderId::ByName(name) => *name == cert.tbs_certificate.subject,
        ResponderId::ByKey(hash) => {
            hash.as_bytes() == key_hash(&cert.tbs_certificate.subject_public_key_info).as_slice()
        }
    }
}

fn is_delegated_responder(candidate: &Certificate, issuer: &Certificate, at: UnixTimestamp) -> bool {
    let has_ocsp_signing = matches!(
        candidate.tbs_certificate.get::<ExtendedKeyUsage>(),
        Ok(Some((_, eku))) if eku.0.contains(&rfc5280::ID_KP_OCSP_SIGNING)
    );
    has_ocsp_signing
        && candidate.tbs_certificate.issuer == issuer.tbs_certificate.subject
        && validity_position(candidate, at) == WindowPosition::Within
        && crate::is_link_valid(candidate, issuer)
}

fn verify_signature(
    spki: &SubjectPublicKeyInfoOwned,
    algorithm: &ObjectIdentifier,
    message: &[u8],
    signature: &[u8],
) -> Result<(), OcspError> {
    let prehash = match *algorithm {
        rfc5912::ECDSA_WITH_SHA_256 => Sha256::digest(message).to_vec(),
        rfc5912::ECDSA_WITH_SHA_384 => Sha384::digest(message).to_vec(),
        other => return Err(OcspError::UnsupportedSignatureAlgorithm(other)),
    };
    let spki_der = spki.to_der().map_err(OcspError::Malformed)?;
    let spki = SubjectPublicKeyInfoRef::try_from(spki_der.as_slice())
        .map_err(|_| OcspError::InvalidSignature)?;
    let key_algorithm = spki.algorithm.oid;

    if let Ok(key) = p256::ecdsa::VerifyingKey::try_from(spki.clone()) {
        let signature =
            p256::ecdsa::Signature::from_der(signature).map_err(|_| OcspError::InvalidSignature)?;
        key.verify_prehash(&prehash, &signature)
            .map_err(|_| OcspError::InvalidSignature)
    } else if let Ok(key) = p384::ecdsa::VerifyingKey::try_from(spki) {
        let signature =
            p384::ecdsa::Signature::from_der(signature).map_err(|_| OcspError::InvalidSignature)?;
        key.verify_prehash(&prehash, &signature)
            .map_err(|_| OcspError::InvalidSignature)
    } else {
        Err(OcspError::UnsupportedSignatureAlgorithm(key_algorithm))
    }
}
