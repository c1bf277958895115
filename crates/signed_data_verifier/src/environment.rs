// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

use serde::{Deserialize, Serialize};
use std::fmt;

/// The server environment a payload was issued for. Unrecognized values are
/// kept verbatim so they survive a round trip.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Environment {
    Production,
    Sandbox,
    Xcode,
    LocalTesting,
    Unknown(String),
}

impl Environment {
    /// Testing-only environments sign payloads with keys that do not chain
    /// to the production roots, so their signatures are not checked.
    pub fn skips_signature_verification(&self) -> bool {
        matches!(self, Self::Xcode | Self::LocalTesting)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Production => "Production",
            Self::Sandbox => "Sandbox",
            Self::Xcode => "Xcode",
            Self::LocalTesting => "LocalTesting",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Environment {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Production" => Self::Production,
            "Sandbox" => Self::Sandbox,
            "Xcode" => Self::Xcode,
            "LocalTesting" => Self::LocalTesting,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for Environment {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_owned())
    }
}

impl From<Environment> for String {
    fn from(environment: Environment) -> Self {
        match environment {
            Environment::Unknown(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
