// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! JWS signature verification. Supports ES256 (ECDSA P-256 with SHA-256)

use crate::{error::VerificationError, jws::SignedToken};
use p256::{
    ecdsa::{signature::Verifier, Signature as P256Signature, VerifyingKey as P256VerifyingKey},
    pkcs8::DecodePublicKey,
};

/// The only accepted `alg` header value.
pub const EXPECTED_ALGORITHM: &str = "ES256";

/// Verifies the token's signature with a PEM `PUBLIC KEY`. The JWS signature
/// is the 64-byte `r || s` concatenation, not DER.
///
/// # Errors
///
/// Returns [`VerificationError::VerificationFailure`] if the key is not a
/// P-256 key, the signature is malformed, or it does not verify.
pub fn verify_signature(token: &SignedToken<'_>, public_key_pem: &str) -> Result<(), VerificationError> {
    let key = P256VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|e| failure(format!("invalid public key: {e}")))?;
    let signature = P256Signature::from_slice(&token.signature)
        .map_err(|e| failure(format!("invalid ECDSA signature encoding: {e}")))?;
    key.verify(token.signing_input(), &signature)
        .map_err(|e| failure(format!("ECDSA signature verification failed: {e}")))
}

fn failure(message: String) -> VerificationError {
    VerificationError::VerificationFailure(message)
}
