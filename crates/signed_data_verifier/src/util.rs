// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Utility functions.

/// Returns the current Unix timestamp at millisecond precision.
pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Returns the current Unix timestamp in whole seconds.
pub(crate) fn now_secs() -> u64 {
    now_millis() / 1000
}
