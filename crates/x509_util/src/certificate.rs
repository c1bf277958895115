// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Certificate decoding for chain verification.
//!
//! `x509-cert` rejects validity times before 1970, which `UTCTime` can
//! express back to 1950. A certificate carrying one is decoded with that
//! time clamped to the epoch. Its real validity period is read from the raw
//! encoding, and its signature is checked over the original bytes.

use crate::{
    time::{parse_time, to_epoch, window_position, EpochSeconds, WindowPosition},
    UnixTimestamp,
};
use der::{Decode, Error as DerError, Header, Reader, SliceReader, Tag, TagNumber};
use std::ops::Range;
use x509_cert::Certificate;
use x509_verify::{Message, Signature, VerifyInfo, VerifyingKey};

const EPOCH_UTC_TIME: &[u8] = b"700101000000Z";
const EPOCH_GENERALIZED_TIME: &[u8] = b"19700101000000Z";

/// A decoded certificate together with its original `tbsCertificate`
/// encoding and validity period.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    /// The decoded certificate. Validity times before 1970 read as the epoch.
    pub cert: Certificate,
    tbs_der: Vec<u8>,
    not_before: EpochSeconds,
    not_after: EpochSeconds,
}

/// A time value inside the certificate encoding.
struct RawTime {
    tag: Tag,
    value: Range<usize>,
    seconds: EpochSeconds,
}

impl ParsedCertificate {
    /// Decodes a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if `der` is not a well-formed certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, DerError> {
        let (tbs_der, [not_before, not_after]) = split_validity(der)?;
        let cert = if not_before.seconds < 0 || not_after.seconds < 0 {
            let mut clamped = der.to_vec();
            for time in [&not_before, &not_after] {
                if time.seconds >= 0 {
                    continue;
                }
                let epoch = if time.tag == Tag::UtcTime {
                    EPOCH_UTC_TIME
                } else {
                    EPOCH_GENERALIZED_TIME
                };
                clamped
                    .get_mut(time.value.clone())
                    .filter(|slot| slot.len() == epoch.len())
                    .ok_or_else(|| time.tag.length_error())?
                    .copy_from_slice(epoch);
            }
            Certificate::from_der(&clamped)?
        } else {
            Certificate::from_der(der)?
        };
        Ok(Self {
            cert,
            tbs_der: tbs_der.to_vec(),
            not_before: not_before.seconds,
            not_after: not_after.seconds,
        })
    }

    pub fn not_before(&self) -> EpochSeconds {
        self.not_before
    }

    pub fn not_after(&self) -> EpochSeconds {
        self.not_after
    }

    /// Places `at` relative to the validity period.
    pub fn validity_position(&self, at: UnixTimestamp) -> WindowPosition {
        window_position(to_epoch(at), self.not_before, Some(self.not_after))
    }

    /// Returns whether `issuer`'s key verifies this certificate's signature.
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        verify_signed_by(&self.tbs_der, &self.cert, issuer)
    }
}

/// Checks `child`'s signature over `tbs_der` with `issuer`'s key.
pub(crate) fn verify_signed_by(tbs_der: &[u8], child: &Certificate, issuer: &Certificate) -> bool {
    let Some(signature) = child.signature.as_bytes() else {
        return false;
    };
    let info = VerifyInfo::new(
        Message::new(tbs_der),
        Signature::new(&child.signature_algorithm, signature),
    );
    VerifyingKey::try_from(issuer).is_ok_and(|key| key.verify_strict(info).is_ok())
}

/// Walks `Certificate` down to `tbsCertificate.validity`. Returns the
/// `tbsCertificate` TLV and both validity times.
fn split_validity(der: &[u8]) -> Result<(&[u8], [RawTime; 2]), DerError> {
    let mut reader = SliceReader::new(der)?;
    Header::decode(&mut reader)?.tag.assert_eq(Tag::Sequence)?;
    let tbs_der = reader.clone().tlv_bytes()?;
    Header::decode(&mut reader)?.tag.assert_eq(Tag::Sequence)?;
    let version = Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::N0,
    };
    if reader.peek_tag()? == version {
        reader.tlv_bytes()?;
    }
    // serialNumber, signature, issuer
    for _ in 0..3 {
        reader.tlv_bytes()?;
    }
    Header::decode(&mut reader)?.tag.assert_eq(Tag::Sequence)?;
    let not_before = raw_time(&mut reader)?;
    let not_after = raw_time(&mut reader)?;
    Ok((tbs_der, [not_before, not_after]))
}

fn raw_time(reader: &mut SliceReader<'_>) -> Result<RawTime, DerError> {
    let header = Header::decode(reader)?;
    let start = usize::try_from(reader.position())?;
    let value = reader.read_slice(header.length)?;
    Ok(RawTime {
        tag: header.tag,
        value: start..start + value.len(),
        seconds: parse_time(header.tag, value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs_from_pem;
    use der::Encode;

    fn parse(pem: &[u8]) -> ParsedCertificate {
        let der = certs_from_pem(pem).unwrap().remove(0);
        ParsedCertificate::from_der(&der).unwrap()
    }

    #[test]
    fn test_matches_strict_decoding() {
        let der = certs_from_pem(include_bytes!("../tests/intermediate.pem"))
            .unwrap()
            .remove(0);
        let parsed = ParsedCertificate::from_der(&der).unwrap();
        let cert = Certificate::from_der(&der).unwrap();

        assert_eq!(parsed.cert, cert);
        assert_eq!(parsed.tbs_der, cert.tbs_certificate.to_der().unwrap());
        let validity = &cert.tbs_certificate.validity;
        assert_eq!(
            parsed.not_before(),
            EpochSeconds::try_from(validity.not_before.to_unix_duration().as_secs()).unwrap()
        );
        assert_eq!(
            parsed.not_after(),
            EpochSeconds::try_from(validity.not_after.to_unix_duration().as_secs()).unwrap()
        );
    }

    #[test]
    fn test_pre_epoch_validity() {
        let root = parse(include_bytes!("../tests/root-1965.pem"));

        // 1965-01-01T00:00:00Z and 2055-01-01T00:00:00Z
        assert_eq!(root.not_before(), -157_766_400);
        assert_eq!(root.not_after(), 2_682_374_400);
        assert_eq!(root.validity_position(0), WindowPosition::Within);
        assert_eq!(root.validity_position(1_792_368_000), WindowPosition::Within);
        assert_eq!(root.validity_position(2_682_374_461), WindowPosition::After);

        // The clamped copy no longer carries the signed bytes, but the
        // self-signature still verifies over the original encoding.
        assert_ne!(root.tbs_der, root.cert.tbs_certificate.to_der().unwrap());
        assert!(root.is_signed_by(&root.cert));
    }

    #[test]
    fn test_signature_over_original_bytes() {
        let root = parse(include_bytes!("../tests/root.pem"));
        let other_root = parse(include_bytes!("../tests/other-root.pem"));
        let intermediate = parse(include_bytes!("../tests/intermediate.pem"));

        assert!(intermediate.is_signed_by(&root.cert));
        assert!(!intermediate.is_signed_by(&other_root.cert));
        assert!(!root.is_signed_by(&other_root.cert));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ParsedCertificate::from_der(&[]).is_err());
        assert!(ParsedCertificate::from_der(&[0x30, 0x03, 0x02, 0x01, 0x01]).is_err());

        let mut der = certs_from_pem(include_bytes!("../tests/root.pem"))
            .unwrap()
            .remove(0);
        der.truncate(der.len() - 1);
        assert!(ParsedCertificate::from_der(&der).is_err());
    }
}
