// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

#![no_main]

use libfuzzer_sys::fuzz_target;
use der::Decode;
use std::sync::LazyLock;
use x509_cert::Certificate;
use x509_util::{
    build_chain,
    ocsp::{check_response, CertId},
};

static CERTS: LazyLock<(Certificate, Certificate)> = LazyLock::new(|| {
    let chain = build_chain!(
        "../../crates/x509_util/tests/leaf.pem",
        "../../crates/x509_util/tests/intermediate.pem"
    );
    (
        Certificate::from_der(&chain[0]).unwrap(),
        Certificate::from_der(&chain[1]).unwrap(),
    )
});

fuzz_target!(|data: &[u8]| {
    let (leaf, intermediate) = &*CERTS;
    let cert_id = CertId::new(leaf, intermediate).unwrap();
    let _ = check_response(data, &cert_id, intermediate, 1_792_368_000);
});
