// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Decoded payload kinds and the identity checks each one is subject to.
//!
//! Only the fields used for policy decisions and a few common ones are typed;
//! everything else is preserved in `other`.

use crate::{environment::Environment, error::VerificationError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Milliseconds since the epoch. Fractional values occur in the wild.
pub type Timestamp = f64;

/// Who the verifier expects payloads to be addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub bundle_id: String,
    /// Only compared when `environment` is production.
    pub app_id: Option<i64>,
    pub environment: Environment,
}

impl AppIdentity {
    fn check_bundle_id(&self, bundle_id: Option<&str>) -> Result<(), VerificationError> {
        if bundle_id == Some(self.bundle_id.as_str()) {
            Ok(())
        } else {
            Err(VerificationError::InvalidAppIdentifier)
        }
    }

    fn check_app_id(&self, app_id: Option<i64>) -> Result<(), VerificationError> {
        if self.environment == Environment::Production && app_id != self.app_id {
            Err(VerificationError::InvalidAppIdentifier)
        } else {
            Ok(())
        }
    }

    fn check_environment(&self, environment: Option<&Environment>) -> Result<(), VerificationError> {
        if environment == Some(&self.environment) {
            Ok(())
        } else {
            Err(VerificationError::InvalidEnvironment)
        }
    }
}

/// A payload type that can be returned by
/// [`SignedDataVerifier::verify_and_decode`](crate::SignedDataVerifier::verify_and_decode).
pub trait SignedPayload: DeserializeOwned {
    /// Checks the payload is addressed to `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidAppIdentifier`] on a bundle or app
    /// identifier mismatch, or [`VerificationError::InvalidEnvironment`] on
    /// an environment mismatch. Identifiers are checked first.
    fn check_identity(&self, identity: &AppIdentity) -> Result<(), VerificationError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub transaction_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub bundle_id: Option<String>,
    pub product_id: Option<String>,
    pub purchase_date: Option<Timestamp>,
    pub expires_date: Option<Timestamp>,
    pub environment: Option<Environment>,
    pub signed_date: Option<Timestamp>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SignedPayload for TransactionPayload {
    fn check_identity(&self, identity: &AppIdentity) -> Result<(), VerificationError> {
        identity.check_bundle_id(self.bundle_id.as_deref())?;
        identity.check_environment(self.environment.as_ref())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfoPayload {
    pub original_transaction_id: Option<String>,
    pub product_id: Option<String>,
    pub auto_renew_product_id: Option<String>,
    pub auto_renew_status: Option<i32>,
    pub renewal_date: Option<Timestamp>,
    pub environment: Option<Environment>,
    pub signed_date: Option<Timestamp>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SignedPayload for RenewalInfoPayload {
    fn check_identity(&self, identity: &AppIdentity) -> Result<(), VerificationError> {
        identity.check_environment(self.environment.as_ref())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub notification_type: Option<String>,
    pub subtype: Option<String>,
    #[serde(rename = "notificationUUID")]
    pub notification_uuid: Option<String>,
    pub version: Option<String>,
    pub signed_date: Option<Timestamp>,
    pub data: Option<NotificationData>,
    pub summary: Option<NotificationSummary>,
    pub external_purchase_token: Option<ExternalPurchaseToken>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub environment: Option<Environment>,
    pub app_apple_id: Option<i64>,
    pub bundle_id: Option<String>,
    pub bundle_version: Option<String>,
    /// Still signed; verify with
    /// [`SignedDataVerifier::verify_and_decode_transaction`](crate::SignedDataVerifier::verify_and_decode_transaction).
    pub signed_transaction_info: Option<String>,
    pub signed_renewal_info: Option<String>,
    pub status: Option<i32>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    pub environment: Option<Environment>,
    pub app_apple_id: Option<i64>,
    pub bundle_id: Option<String>,
    pub product_id: Option<String>,
    pub request_identifier: Option<String>,
    pub storefront_country_codes: Option<Vec<String>>,
    pub succeeded_count: Option<i64>,
    pub failed_count: Option<i64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPurchaseToken {
    pub external_purchase_id: Option<String>,
    pub token_creation_date: Option<Timestamp>,
    pub app_apple_id: Option<i64>,
    pub bundle_id: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ExternalPurchaseToken {
    /// Tokens carry no environment field; sandbox tokens are marked by their
    /// identifier prefix.
    pub fn environment(&self) -> Environment {
        if self
            .external_purchase_id
            .as_deref()
            .is_some_and(|id| id.starts_with("SANDBOX"))
        {
            Environment::Sandbox
        } else {
            Environment::Production
        }
    }
}

impl SignedPayload for NotificationPayload {
    fn check_identity(&self, identity: &AppIdentity) -> Result<(), VerificationError> {
        let (bundle_id, app_id, environment) = if let Some(data) = &self.data {
            (data.bundle_id.as_deref(), data.app_apple_id, data.environment.clone())
        } else if let Some(summary) = &self.summary {
            (summary.bundle_id.as_deref(), summary.app_apple_id, summary.environment.clone())
        } else if let Some(token) = &self.external_purchase_token {
            (token.bundle_id.as_deref(), token.app_apple_id, Some(token.environment()))
        } else {
            (None, None, None)
        };
        identity.check_bundle_id(bundle_id)?;
        identity.check_app_id(app_id)?;
        identity.check_environment(environment.as_ref())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppTransactionPayload {
    /// The environment the receipt was issued in.
    pub receipt_type: Option<Environment>,
    pub app_apple_id: Option<i64>,
    pub bundle_id: Option<String>,
    pub application_version: Option<String>,
    pub original_application_version: Option<String>,
    pub receipt_creation_date: Option<Timestamp>,
    pub original_purchase_date: Option<Timestamp>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SignedPayload for AppTransactionPayload {
    fn check_identity(&self, identity: &AppIdentity) -> Result<(), VerificationError> {
        identity.check_bundle_id(self.bundle_id.as_deref())?;
        identity.check_app_id(self.app_apple_id)?;
        identity.check_environment(self.receipt_type.as_ref())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeRequestPayload {
    pub original_transaction_id: Option<String>,
    pub app_apple_id: Option<i64>,
    pub product_id: Option<String>,
    pub user_locale: Option<String>,
    pub request_identifier: Option<String>,
    pub environment: Option<Environment>,
    pub signed_date: Option<Timestamp>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SignedPayload for RealtimeRequestPayload {
    fn check_identity(&self, identity: &AppIdentity) -> Result<(), VerificationError> {
        identity.check_app_id(self.app_apple_id)?;
        identity.check_environment(self.environment.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(environment: Environment) -> AppIdentity {
        AppIdentity {
            bundle_id: "com.example".into(),
            app_id: Some(1234),
            environment,
        }
    }

    fn decode<T: SignedPayload>(value: Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_transaction() {
        let payload: TransactionPayload = decode(json!({
            "bundleId": "com.example",
            "environment": "Sandbox",
            "transactionId": "1",
            "inAppOwnershipType": "PURCHASED",
        }));
        assert_eq!(payload.other["inAppOwnershipType"], "PURCHASED");
        payload.check_identity(&identity(Environment::Sandbox)).unwrap();
        assert_eq!(
            payload.check_identity(&identity(Environment::Production)),
            Err(VerificationError::InvalidEnvironment)
        );

        let wrong_bundle: TransactionPayload =
            decode(json!({"bundleId": "com.other", "environment": "Sandbox"}));
        assert_eq!(
            wrong_bundle.check_identity(&identity(Environment::Sandbox)),
            Err(VerificationError::InvalidAppIdentifier)
        );
    }

    #[test]
    fn test_renewal_info_checks_environment_only() {
        let payload: RenewalInfoPayload = decode(json!({"environment": "Sandbox"}));
        payload.check_identity(&identity(Environment::Sandbox)).unwrap();
        assert_eq!(
            payload.check_identity(&identity(Environment::Xcode)),
            Err(VerificationError::InvalidEnvironment)
        );
        let missing: RenewalInfoPayload = decode(json!({}));
        assert_eq!(
            missing.check_identity(&identity(Environment::Sandbox)),
            Err(VerificationError::InvalidEnvironment)
        );
    }

    #[test]
    fn test_notification_data() {
        let payload: NotificationPayload = decode(json!({
            "notificationType": "SUBSCRIBED",
            "notificationUUID": "uuid",
            "data": {"bundleId": "com.example", "appAppleId": 1234, "environment": "Production"},
        }));
        assert_eq!(payload.notification_uuid.as_deref(), Some("uuid"));
        payload.check_identity(&identity(Environment::Production)).unwrap();

        let wrong_app: NotificationPayload = decode(json!({
            "data": {"bundleId": "com.example", "appAppleId": 999, "environment": "Production"},
        }));
        assert_eq!(
            wrong_app.check_identity(&identity(Environment::Production)),
            Err(VerificationError::InvalidAppIdentifier)
        );
    }

    #[test]
    fn test_notification_app_id_ignored_outside_production() {
        let payload: NotificationPayload = decode(json!({
            "summary": {"bundleId": "com.example", "appAppleId": 999, "environment": "Sandbox"},
        }));
        payload.check_identity(&identity(Environment::Sandbox)).unwrap();
    }

    #[test]
    fn test_external_purchase_token_environment() {
        let sandbox: NotificationPayload = decode(json!({
            "externalPurchaseToken": {
                "externalPurchaseId": "SANDBOX_b2158121-7af9-49d4-9561-1f588205523e",
                "bundleId": "com.example",
                "appAppleId": 1234,
            },
        }));
        sandbox.check_identity(&identity(Environment::Sandbox)).unwrap();
        assert_eq!(
            sandbox.check_identity(&identity(Environment::Production)),
            Err(VerificationError::InvalidEnvironment)
        );

        let production: NotificationPayload = decode(json!({
            "externalPurchaseToken": {
                "externalPurchaseId": "b2158121-7af9-49d4-9561-1f588205523e",
                "bundleId": "com.example",
                "appAppleId": 1234,
            },
        }));
        production.check_identity(&identity(Environment::Production)).unwrap();
    }

    #[test]
    fn test_empty_notification() {
        let payload: NotificationPayload = decode(json!({"notificationType": "TEST"}));
        assert_eq!(
            payload.check_identity(&identity(Environment::Sandbox)),
            Err(VerificationError::InvalidAppIdentifier)
        );
    }

    #[test]
    fn test_app_transaction() {
        let payload: AppTransactionPayload = decode(json!({
            "receiptType": "Production",
            "bundleId": "com.example",
            "appAppleId": 1234,
            "receiptCreationDate": 1_698_148_900_000_u64,
        }));
        payload.check_identity(&identity(Environment::Production)).unwrap();
        assert_eq!(
            payload.check_identity(&identity(Environment::Sandbox)),
            Err(VerificationError::InvalidEnvironment)
        );
    }

    #[test]
    fn test_realtime_request() {
        let payload: RealtimeRequestPayload = decode(json!({
            "appAppleId": 1234,
            "environment": "LocalTesting",
        }));
        payload.check_identity(&identity(Environment::LocalTesting)).unwrap();
        let production: RealtimeRequestPayload =
            decode(json!({"appAppleId": 1, "environment": "Production"}));
        assert_eq!(
            production.check_identity(&identity(Environment::Production)),
            Err(VerificationError::InvalidAppIdentifier)
        );
    }
}
