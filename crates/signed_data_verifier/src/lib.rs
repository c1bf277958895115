// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Verification of signed payloads from an app storefront's server API:
//! transactions, renewal info, notifications, app transactions and realtime
//! requests.
//!
//! Each payload is a compact JWS whose `x5c` header carries a three
//! certificate chain. [`SignedDataVerifier`] checks the chain against
//! configured roots (see [`x509_util::ChainVerifier`]), checks the ES256
//! signature with the leaf key, and then checks that the payload is
//! addressed to the configured app and environment.
//!
//! ```no_run
//! use signed_data_verifier::{SignedDataVerifier, VerifierConfig};
//!
//! # fn run(config_json: &str, signed: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config: VerifierConfig = serde_json::from_str(config_json)?;
//! let verifier = SignedDataVerifier::new(&config)?;
//! let transaction = verifier.verify_and_decode_transaction(signed)?;
//! println!("{:?}", transaction.transaction_id);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod environment;
pub mod error;
pub mod jws;
pub mod models;
pub mod signature;
mod util;
mod verifier;

pub use cache::{CacheStats, TrustCache};
pub use config::VerifierConfig;
pub use environment::Environment;
pub use error::VerificationError;
pub use models::*;
pub use verifier::SignedDataVerifier;
