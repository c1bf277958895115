// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

#![no_main]

use libfuzzer_sys::fuzz_target;
use signed_data_verifier::jws::SignedToken;

fuzz_target!(|data: &str| {
    if let Ok(token) = SignedToken::peek(data) {
        let _ = token.signing_time();
    }
});
