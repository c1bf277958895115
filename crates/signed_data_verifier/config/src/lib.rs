// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

// Verifier configuration, in a separate crate so embedding applications can
// load it without pulling in the verification stack.
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifierConfig {
    /// DER root certificates, standard base64.
    #[serde_as(as = "Vec<Base64>")]
    pub trust_anchors: Vec<Vec<u8>>,
    /// One of `Production`, `Sandbox`, `Xcode` or `LocalTesting`.
    pub environment: String,
    pub bundle_id: String,
    /// Required for `Production`.
    #[serde(default)]
    pub app_id: Option<i64>,
    #[serde(default)]
    pub enable_online_checks: bool,
    #[serde(default = "default_enable_strict_chain_checks")]
    pub enable_strict_chain_checks: bool,
    #[serde(default = "default_ocsp_timeout_millis")]
    pub ocsp_timeout_millis: u64,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
}

fn default_enable_strict_chain_checks() -> bool {
    true
}

fn default_ocsp_timeout_millis() -> u64 {
    30_000
}

fn default_cache_ttl_seconds() -> u64 {
    900
}

fn default_cache_max_size() -> usize {
    32
}
