// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

use thiserror::Error;
use x509_util::{ChainError, ChainErrorKind};

/// Every way a verification call can fail. Only
/// [`VerificationError::RetryableVerificationFailure`] is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("invalid certificate chain length: {0}")]
    InvalidChainLength(usize),

    #[error("invalid certificate chain: {0}")]
    InvalidChain(String),

    #[error("verification failure: {0}")]
    VerificationFailure(String),

    #[error("environment does not match the configured environment")]
    InvalidEnvironment,

    #[error("bundle or app identifier does not match the configured identifiers")]
    InvalidAppIdentifier,

    #[error("retryable verification failure: {0}")]
    RetryableVerificationFailure(String),
}

impl VerificationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableVerificationFailure(_))
    }
}

impl From<ChainError> for VerificationError {
    fn from(e: ChainError) -> Self {
        let message = e.to_string();
        match e.kind() {
            ChainErrorKind::InvalidCertificate => Self::InvalidCertificate(message),
            ChainErrorKind::InvalidChain => Self::InvalidChain(message),
            ChainErrorKind::InvalidChainLength(len) => Self::InvalidChainLength(len),
            ChainErrorKind::VerificationFailure => Self::VerificationFailure(message),
            ChainErrorKind::RetryableVerificationFailure => {
                Self::RetryableVerificationFailure(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_util::CertRole;

    #[test]
    fn test_from_chain_error() {
        assert_eq!(
            VerificationError::from(ChainError::InvalidChainLength(4)),
            VerificationError::InvalidChainLength(4)
        );
        assert!(matches!(
            VerificationError::from(ChainError::NoTrustAnchors),
            VerificationError::InvalidCertificate(_)
        ));
        assert!(matches!(
            VerificationError::from(ChainError::UntrustedRoot),
            VerificationError::InvalidChain(_)
        ));
        assert!(matches!(
            VerificationError::from(ChainError::NotYetValid(CertRole::Leaf)),
            VerificationError::VerificationFailure(_)
        ));
        let retryable = VerificationError::from(ChainError::RevocationUnknown(CertRole::Leaf));
        assert!(retryable.is_retryable());
        assert!(!VerificationError::InvalidEnvironment.is_retryable());
    }
}
