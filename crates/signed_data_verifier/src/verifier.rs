// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

use crate::{
    cache::TrustCache,
    environment::Environment,
    error::VerificationError,
    jws::SignedToken,
    models::{
        AppIdentity, AppTransactionPayload, NotificationPayload, RealtimeRequestPayload,
        RenewalInfoPayload, SignedPayload, TransactionPayload,
    },
    signature::{verify_signature, EXPECTED_ALGORITHM},
    util::now_secs,
};
use base64::prelude::*;
use config::VerifierConfig;
use log::debug;
use std::{sync::Arc, time::Duration};
use x509_util::{
    transport::{HttpOcspTransport, OcspTransport},
    ChainVerifier, PolicyDigest, TrustAnchors, UnixTimestamp, CHAIN_LENGTH,
};

/// Verifies signed payloads for one app in one environment.
///
/// Safe to share between threads. Verifiers can share a [`TrustCache`] via
/// [`SignedDataVerifier::with_trust_cache`]; a cached chain is only reused by
/// verifiers with the same trust anchors and strictness.
pub struct SignedDataVerifier {
    identity: AppIdentity,
    chain_verifier: ChainVerifier,
    policy: PolicyDigest,
    enable_online_checks: bool,
    trust_cache: Arc<TrustCache>,
}

impl SignedDataVerifier {
    /// Builds a verifier from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidAppIdentifier`] for a production
    /// configuration without an app identifier,
    /// [`VerificationError::InvalidEnvironment`] for an unrecognized
    /// environment, and [`VerificationError::InvalidCertificate`] if a trust
    /// anchor does not parse.
    pub fn new(config: &VerifierConfig) -> Result<Self, VerificationError> {
        let environment = Environment::from(config.environment.as_str());
        if let Environment::Unknown(raw) = &environment {
            debug!("rejecting configuration with unknown environment {raw:?}");
            return Err(VerificationError::InvalidEnvironment);
        }
        if environment == Environment::Production && config.app_id.is_none() {
            return Err(VerificationError::InvalidAppIdentifier);
        }

        let anchors = TrustAnchors::new(config.trust_anchors.clone())?;
        let transport = HttpOcspTransport::new(Duration::from_millis(config.ocsp_timeout_millis));
        let chain_verifier = ChainVerifier::new(anchors, config.enable_strict_chain_checks)
            .with_transport(Arc::new(transport));
        let policy = chain_verifier.policy_digest();
        let trust_cache = TrustCache::new(
            Duration::from_secs(config.cache_ttl_seconds),
            config.cache_max_size,
        );

        Ok(Self {
            identity: AppIdentity {
                bundle_id: config.bundle_id.clone(),
                app_id: config.app_id,
                environment,
            },
            chain_verifier,
            policy,
            enable_online_checks: config.enable_online_checks,
            trust_cache: Arc::new(trust_cache),
        })
    }

    /// Replaces the verifier's private cache with a shared one.
    #[must_use]
    pub fn with_trust_cache(mut self, trust_cache: Arc<TrustCache>) -> Self {
        self.trust_cache = trust_cache;
        self
    }

    #[must_use]
    pub fn with_ocsp_transport(mut self, transport: Arc<dyn OcspTransport>) -> Self {
        self.chain_verifier = self.chain_verifier.with_transport(transport);
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.identity.environment
    }

    pub fn trust_cache(&self) -> &Arc<TrustCache> {
        &self.trust_cache
    }

    /// Verifies `signed` and decodes its claims as `T`.
    ///
    /// In the testing-only environments the token is not checked
    /// cryptographically at all. Identity checks apply in every environment.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered, classified as a
    /// [`VerificationError`].
    pub fn verify_and_decode<T: SignedPayload>(&self, signed: &str) -> Result<T, VerificationError> {
        let token = SignedToken::peek(signed)?;
        if self.identity.environment.skips_signature_verification() {
            debug!(
                "{} environment; accepting payload without signature verification",
                self.identity.environment
            );
        } else {
            self.verify_token(&token)?;
        }

        let payload: T = serde_json::from_value(token.claims).map_err(|e| {
            VerificationError::VerificationFailure(format!("unexpected payload: {e}"))
        })?;
        payload.check_identity(&self.identity)?;
        Ok(payload)
    }

    /// Verifies and decodes a signed transaction.
    ///
    /// # Errors
    ///
    /// See [`SignedDataVerifier::verify_and_decode`].
    pub fn verify_and_decode_transaction(&self, signed: &str) -> Result<TransactionPayload, VerificationError> {
        self.verify_and_decode(signed)
    }

    /// Verifies and decodes signed subscription renewal info.
    ///
    /// # Errors
    ///
    /// See [`SignedDataVerifier::verify_and_decode`].
    pub fn verify_and_decode_renewal_info(&self, signed: &str) -> Result<RenewalInfoPayload, VerificationError> {
        self.verify_and_decode(signed)
    }

    /// Verifies and decodes a server notification. Nested signed fields are
    /// left encoded.
    ///
    /// # Errors
    ///
    /// See [`SignedDataVerifier::verify_and_decode`].
    pub fn verify_and_decode_notification(&self, signed: &str) -> Result<NotificationPayload, VerificationError> {
        self.verify_and_decode(signed)
    }

    /// Verifies and decodes a signed app transaction.
    ///
    /// # Errors
    ///
    /// See [`SignedDataVerifier::verify_and_decode`].
    pub fn verify_and_decode_app_transaction(&self, signed: &str) -> Result<AppTransactionPayload, VerificationError> {
        self.verify_and_decode(signed)
    }

    /// Verifies and decodes a realtime request body.
    ///
    /// # Errors
    ///
    /// See [`SignedDataVerifier::verify_and_decode`].
    pub fn verify_and_decode_realtime_request(&self, signed: &str) -> Result<RealtimeRequestPayload, VerificationError> {
        self.verify_and_decode(signed)
    }

    fn verify_token(&self, token: &SignedToken<'_>) -> Result<(), VerificationError> {
        if token.header.alg.as_deref() != Some(EXPECTED_ALGORITHM) {
            return Err(VerificationError::VerificationFailure(format!(
                "unsupported algorithm {:?}",
                token.header.alg
            )));
        }
        let x5c = match token.header.x5c.as_deref() {
            Some(x5c) if !x5c.is_empty() => x5c,
            _ => {
                return Err(VerificationError::VerificationFailure(
                    "missing x5c header".into(),
                ))
            }
        };
        if x5c.len() != CHAIN_LENGTH {
            return Err(VerificationError::InvalidChainLength(x5c.len()));
        }
        let chain = x5c
            .iter()
            .map(|cert| {
                BASE64_STANDARD.decode(cert).map_err(|e| {
                    VerificationError::InvalidCertificate(format!("x5c entry is not base64: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let public_key = self.verify_chain(&chain, token.signing_time())?;
        verify_signature(token, &public_key)
    }

    /// Returns the leaf public key of a trusted chain, consulting the cache
    /// when online checks are enabled.
    fn verify_chain(
        &self,
        chain: &[Vec<u8>],
        signing_time: Option<UnixTimestamp>,
    ) -> Result<String, VerificationError> {
        let effective_date = match signing_time {
            Some(signed_at) if !self.enable_online_checks => signed_at,
            _ => now_secs(),
        };

        if self.enable_online_checks {
            if let Some(public_key) = self.trust_cache.get(&self.policy, chain) {
                debug!("trust cache hit");
                return Ok(public_key);
            }
        }

        let public_key =
            self.chain_verifier
                .verify_chain(chain, self.enable_online_checks, effective_date)?;
        if self.enable_online_checks {
            self.trust_cache.put(&self.policy, chain, public_key.clone());
        }
        Ok(public_key)
    }
}
