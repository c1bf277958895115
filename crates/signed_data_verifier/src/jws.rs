// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Unverified reading of compact JWS tokens.
//!
//! A [`SignedToken`] exposes the header and claims before the signature is
//! checked, since the header carries the certificate chain needed to check
//! it. Nothing read here is trustworthy until [`crate::signature`] says so.

use crate::error::VerificationError;
use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurpose, DecodePaddingMode, GeneralPurposeConfig},
    Engine,
};
use serde::Deserialize;
use serde_json::Value;

/// base64url that tolerates both padded and unpadded input.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub alg: Option<String>,
    /// Standard (not URL-safe) base64 DER certificates, leaf first.
    pub x5c: Option<Vec<String>>,
}

/// A compact JWS split into its parts.
#[derive(Debug, Clone)]
pub struct SignedToken<'a> {
    signing_input: &'a str,
    pub header: Header,
    pub claims: Value,
    pub signature: Vec<u8>,
}

impl<'a> SignedToken<'a> {
    /// Splits and decodes `token` without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::VerificationFailure`] if the token does not
    /// have exactly three segments, a segment is not base64url, or the header
    /// or claims are not JSON objects.
    pub fn peek(token: &'a str) -> Result<Self, VerificationError> {
        let mut segments = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(malformed("expected three segments"));
        };

        let header: Header = serde_json::from_slice(&decode_segment(header)?)
            .map_err(|e| malformed(&format!("header: {e}")))?;
        let claims: Value = serde_json::from_slice(&decode_segment(claims)?)
            .map_err(|e| malformed(&format!("claims: {e}")))?;
        if !claims.is_object() {
            return Err(malformed("claims are not an object"));
        }
        let signature = decode_segment(signature)?;

        // Everything before the last dot is what was signed.
        let signing_input = token.rsplit_once('.').map_or(token, |(head, _)| head);
        Ok(Self {
            signing_input,
            header,
            claims,
            signature,
        })
    }

    /// The `header.payload` bytes covered by the signature.
    pub fn signing_input(&self) -> &'a [u8] {
        self.signing_input.as_bytes()
    }

    /// The signing time in whole seconds, from `signedDate` or, for app
    /// transactions, `receiptCreationDate`. Both are milliseconds since the
    /// epoch and may be fractional.
    pub fn signing_time(&self) -> Option<u64> {
        ["signedDate", "receiptCreationDate"]
            .iter()
            .find_map(|claim| self.claims.get(claim).and_then(Value::as_f64))
            .filter(|millis| millis.is_finite() && *millis >= 0.0)
            .map(|millis| (millis / 1000.0).floor() as u64)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, VerificationError> {
    BASE64_URL
        .decode(segment)
        .map_err(|e| malformed(&format!("segment is not base64url: {e}")))
}

fn malformed(reason: &str) -> VerificationError {
    VerificationError::VerificationFailure(format!("malformed token: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::BASE64_URL_SAFE_NO_PAD;
    use serde_json::json;

    fn token(header: &Value, claims: &Value, signature: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header.to_string()),
            BASE64_URL_SAFE_NO_PAD.encode(claims.to_string()),
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        )
    }

    #[test]
    fn test_peek() {
        let raw = token(
            &json!({"alg": "ES256", "x5c": ["AAA", "BBB", "CCC"]}),
            &json!({"signedDate": 1_700_000_000_123_u64, "environment": "Sandbox"}),
            b"sig",
        );
        let token = SignedToken::peek(&raw).unwrap();
        assert_eq!(token.header.alg.as_deref(), Some("ES256"));
        assert_eq!(token.header.x5c.as_ref().map(Vec::len), Some(3));
        assert_eq!(token.claims["environment"], "Sandbox");
        assert_eq!(token.signature, b"sig");
        assert_eq!(token.signing_time(), Some(1_700_000_000));

        let (head, _) = raw.rsplit_once('.').unwrap();
        assert_eq!(token.signing_input(), head.as_bytes());
    }

    #[test]
    fn test_segment_count() {
        let raw = token(&json!({}), &json!({}), b"");
        assert!(SignedToken::peek(&raw).is_ok());
        assert!(SignedToken::peek(&format!("{raw}.extra")).is_err());
        assert!(SignedToken::peek("only.two").is_err());
        assert!(SignedToken::peek("").is_err());
    }

    #[test]
    fn test_padding_indifferent() {
        let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256"}"#);
        let claims = base64::prelude::BASE64_URL_SAFE.encode(br#"{"a":1}"#);
        assert!(claims.ends_with('='));
        SignedToken::peek(&format!("{header}.{claims}.")).unwrap();
    }

    #[test]
    fn test_malformed_segments() {
        let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256"}"#);
        let not_json = BASE64_URL_SAFE_NO_PAD.encode(b"not json");
        let not_object = BASE64_URL_SAFE_NO_PAD.encode(b"[1,2]");
        for raw in [
            format!("{header}.{not_json}.AA"),
            format!("{not_json}.{header}.AA"),
            format!("{header}.{not_object}.AA"),
            format!("{header}.{header}.!!"),
        ] {
            assert!(
                matches!(
                    SignedToken::peek(&raw),
                    Err(VerificationError::VerificationFailure(_))
                ),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_signing_time() {
        let at = |claims: Value| {
            SignedToken::peek(&token(&json!({}), &claims, b""))
                .unwrap()
                .signing_time()
        };
        assert_eq!(at(json!({"signedDate": 1_699_999_999_999.9})), Some(1_699_999_999));
        assert_eq!(at(json!({"receiptCreationDate": 5_000})), Some(5));
        assert_eq!(at(json!({"signedDate": 2_000, "receiptCreationDate": 5_000})), Some(2));
        assert_eq!(at(json!({"signedDate": "soon"})), None);
        assert_eq!(at(json!({})), None);
    }
}
