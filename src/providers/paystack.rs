//! Paystack gateway client.
//!
//! Initiation returns a hosted checkout URL keyed by a caller-issued unique
//! reference. Webhook bodies are never trusted: the HMAC-SHA512 signature
//! over the raw body must validate first, and every webhook still triggers a
//! mandatory server-side verify call before any state change.

use chrono::DateTime;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

use super::VerifyOutcome;

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub api_base: String,
    /// Secret key, used both for API auth and webhook HMAC validation.
    pub secret_key: String,
    /// Browser return URL after hosted checkout; injected at construction.
    pub callback_url: String,
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    status: bool,
    data: Option<InitializeData>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    data: Option<VerifyData>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: i64,
    status: String,
    amount: i64,
    currency: String,
    channel: Option<String>,
    paid_at: Option<String>,
}

/// Result of a hosted-checkout initiation.
#[derive(Debug, Clone)]
pub struct CheckoutInitiated {
    pub authorization_url: String,
}

#[derive(Debug, Clone)]
pub struct PaystackClient {
    client: Client,
    config: PaystackConfig,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Initialize a transaction and return the hosted checkout URL.
    /// `amount_cents` is passed in the currency's subunit, as the API expects.
    pub async fn initialize_transaction(
        &self,
        reference: &str,
        email: &str,
        amount_cents: i64,
        currency: &str,
    ) -> Result<CheckoutInitiated> {
        let body = json!({
            "reference": reference,
            "email": email,
            "amount": amount_cents,
            "currency": currency,
            "callback_url": self.config.callback_url,
        });

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.config.api_base))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Paystack initialize error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Paystack initialize error: {}",
                error_text
            )));
        }

        let init: InitializeResponse = response.json().await.map_err(|e| {
            AppError::Provider(format!("Failed to parse Paystack initialize response: {}", e))
        })?;

        match (init.status, init.data) {
            (true, Some(data)) => Ok(CheckoutInitiated {
                authorization_url: data.authorization_url,
            }),
            _ => Err(AppError::Provider(format!(
                "Paystack initialize rejected: {}",
                init.message.unwrap_or_default()
            ))),
        }
    }

    /// Validate the webhook signature: HMAC-SHA512 over the raw body with
    /// the secret key, hex-encoded, compared constant-time.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let mut mac = HmacSha512::new_from_slice(self.config.secret_key.as_bytes())
            .map_err(|_| AppError::Internal("Invalid Paystack secret key".into()))?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();

        // Length check is not constant-time, but signature length is not
        // secret (always 128 hex chars for SHA-512).
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    /// Authoritatively verify a transaction by reference. Mandatory after
    /// every webhook; also the reconciliation path's source of truth.
    pub async fn verify_transaction(&self, reference: &str) -> Result<VerifyOutcome> {
        let response = self
            .client
            .get(format!(
                "{}/transaction/verify/{}",
                self.config.api_base, reference
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Paystack verify error: {}", e)))?;

        let raw = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("Paystack verify error: {}", e)))?;

        let verify: VerifyResponse = serde_json::from_str(&raw)
            .map_err(|e| AppError::Provider(format!("Failed to parse Paystack verify: {}", e)))?;

        let data = match (verify.status, verify.data) {
            (true, Some(data)) => data,
            _ => {
                return Err(AppError::Provider(format!(
                    "Paystack verify rejected: {}",
                    verify.message.unwrap_or_default()
                )))
            }
        };

        let paid_at = data
            .paid_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp());

        Ok(VerifyOutcome {
            successful: data.status == "success",
            amount_cents: data.amount,
            currency: data.currency.to_uppercase(),
            provider_transaction_id: Some(data.id.to_string()),
            channel: data.channel,
            paid_at,
            status: data.status,
            raw_payload: raw,
        })
    }
}

/// Best-effort parse of a Paystack webhook body into (event_type, reference).
pub fn parse_webhook_hint(raw_body: &str) -> (Option<String>, Option<String>) {
    let value: serde_json::Value = match serde_json::from_str(raw_body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };
    let event_type = value
        .get("event")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let reference = value
        .pointer("/data/reference")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    (event_type, reference)
}
