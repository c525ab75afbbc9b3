//! M-Pesa STK push (Daraja) client.
//!
//! Initiation is an OAuth client-credentials token fetch followed by the
//! push request. The asynchronous callback itself carries the authoritative
//! result (ResultCode 0 = success), so verification of a callback is a pure
//! parse - there is no server-to-server confirmation call on that path.
//! The reconciliation path uses the STK status-query endpoint instead.

use base64::Engine;
use chrono::{NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};

use super::VerifyOutcome;

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub api_base: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    /// Injected at construction; never resolved per request.
    pub callback_url: String,
}

#[derive(Debug, Deserialize)]
struct OauthResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryResponse {
    result_code: String,
    result_desc: String,
}

/// Correlation identifiers returned by a successful push initiation.
#[derive(Debug, Clone)]
pub struct PushInitiated {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
}

#[derive(Debug, Clone)]
pub struct MpesaClient {
    client: Client,
    config: MpesaConfig,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn oauth_token(&self) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.api_base
            ))
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("M-Pesa OAuth error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("M-Pesa OAuth error: {}", error_text)));
        }

        let token: OauthResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse M-Pesa OAuth response: {}", e)))?;
        Ok(token.access_token)
    }

    fn password(&self, timestamp: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }

    /// Initiate an STK push to the payer's phone. The API only accepts whole
    /// currency units, so `amount_cents` must be a multiple of 100; anything
    /// else is rejected rather than truncated, since a push for less than the
    /// intent's amount would fail verification after the customer paid.
    pub async fn stk_push(
        &self,
        phone: &str,
        amount_cents: i64,
        account_reference: &str,
        description: &str,
    ) -> Result<PushInitiated> {
        if amount_cents % 100 != 0 {
            return Err(AppError::Internal(format!(
                "M-Pesa push amount must be whole KES, got {} cents",
                amount_cents
            )));
        }

        let token = self.oauth_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount_cents / 100,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": description,
        });

        let response = self
            .client
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.api_base
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("M-Pesa STK push error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("M-Pesa STK push error: {}", error_text)));
        }

        let push: StkPushResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse STK push response: {}", e)))?;

        if push.response_code != "0" {
            return Err(AppError::Provider(format!(
                "M-Pesa STK push rejected: code {}",
                push.response_code
            )));
        }

        Ok(PushInitiated {
            merchant_request_id: push.merchant_request_id,
            checkout_request_id: push.checkout_request_id,
        })
    }

    /// Query the outcome of a push whose callback never arrived. The query
    /// reports outcome only (no amount), so callers apply it against the
    /// intent's stored amount.
    pub async fn query_status(&self, checkout_request_id: &str) -> Result<VerifyOutcome> {
        let token = self.oauth_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self
            .client
            .post(format!(
                "{}/mpesa/stkpushquery/v1/query",
                self.config.api_base
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("M-Pesa status query error: {}", e)))?;

        let raw = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("M-Pesa status query error: {}", e)))?;

        let query: StkQueryResponse = serde_json::from_str(&raw)
            .map_err(|e| AppError::Provider(format!("Failed to parse status query: {}", e)))?;

        Ok(VerifyOutcome {
            successful: query.result_code == "0",
            // Outcome-only response: the push was placed for the intent's
            // amount, which the caller substitutes before applying.
            amount_cents: 0,
            currency: String::new(),
            provider_transaction_id: None,
            channel: Some("mpesa_stk".to_string()),
            paid_at: None,
            status: query.result_desc,
            raw_payload: raw,
        })
    }
}

/// Parsed STK callback: the correlation id plus the normalized outcome.
#[derive(Debug, Clone)]
pub struct PushCallback {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub outcome: VerifyOutcome,
}

/// Parse an STK callback body. This is the push provider's `Verify`: the
/// callback carries the authoritative result and needs no follow-up call.
pub fn parse_push_callback(raw_body: &str) -> Result<PushCallback> {
    let value: serde_json::Value = serde_json::from_str(raw_body)?;
    let callback = value
        .get("Body")
        .and_then(|b| b.get("stkCallback"))
        .ok_or_else(|| AppError::BadRequest("Not an STK callback payload".into()))?;

    let checkout_request_id = callback
        .get("CheckoutRequestID")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("Callback missing CheckoutRequestID".into()))?
        .to_string();
    let merchant_request_id = callback
        .get("MerchantRequestID")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let result_code = callback
        .get("ResultCode")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| AppError::BadRequest("Callback missing ResultCode".into()))?;
    let result_desc = callback
        .get("ResultDesc")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut amount_cents = 0;
    let mut receipt = None;
    let mut paid_at = None;

    if let Some(items) = callback
        .pointer("/CallbackMetadata/Item")
        .and_then(|v| v.as_array())
    {
        for item in items {
            match item.get("Name").and_then(|n| n.as_str()) {
                Some("Amount") => {
                    if let Some(a) = item.get("Value").and_then(|v| v.as_f64()) {
                        amount_cents = (a * 100.0).round() as i64;
                    }
                }
                Some("MpesaReceiptNumber") => {
                    receipt = item
                        .get("Value")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
                Some("TransactionDate") => {
                    // Provider local time as yyyymmddHHMMSS (e.g. 20250114093012)
                    paid_at = item
                        .get("Value")
                        .and_then(|v| v.as_i64())
                        .and_then(|d| {
                            NaiveDateTime::parse_from_str(&d.to_string(), "%Y%m%d%H%M%S").ok()
                        })
                        .map(|dt| dt.and_utc().timestamp());
                }
                _ => {}
            }
        }
    }

    Ok(PushCallback {
        checkout_request_id,
        merchant_request_id,
        outcome: VerifyOutcome {
            successful: result_code == 0,
            amount_cents,
            // M-Pesa settles in KES only.
            currency: "KES".to_string(),
            provider_transaction_id: receipt,
            channel: Some("mpesa_stk".to_string()),
            paid_at,
            status: result_desc,
            raw_payload: raw_body.to_string(),
        },
    })
}
