// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::LazyLock;
use x509_util::{build_chain, ChainVerifier, TrustAnchors};

static ISSUERS: LazyLock<Vec<Vec<u8>>> = LazyLock::new(|| {
    build_chain!(
        "../../crates/x509_util/tests/intermediate.pem",
        "../../crates/x509_util/tests/root.pem"
    )
});

static VERIFIER: LazyLock<ChainVerifier> = LazyLock::new(|| {
    ChainVerifier::new(TrustAnchors::new(vec![ISSUERS[1].clone()]).unwrap(), true)
});

// Fuzzes the leaf slot of an otherwise trusted chain.
fuzz_target!(|data: &[u8]| {
    let chain = [data.to_vec(), ISSUERS[0].clone(), ISSUERS[1].clone()];
    let _ = VERIFIER.verify_chain(&chain, false, 1_792_368_000);
});
