use std::env;

use crate::providers::{MpesaConfig, PaystackConfig};

/// Server configuration, loaded once at startup.
///
/// Provider callback URLs are resolved here and injected into the provider
/// clients at construction - handlers never build callback URLs ad hoc.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Shared token for operator endpoints (manual transfer approval).
    pub operator_token: String,
    /// VAT rate in basis points (1600 = 16%), applied tax-inclusive.
    pub vat_rate_bps: i64,
    /// One-time registration fee in cents, charged on SignupFee intents.
    pub signup_fee_cents: i64,
    pub mpesa: MpesaConfig,
    pub paystack: PaystackConfig,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("SHERIAPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let mpesa = MpesaConfig {
            api_base: env::var("MPESA_API_BASE")
                .unwrap_or_else(|_| "https://api.safaricom.co.ke".to_string()),
            consumer_key: env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            shortcode: env::var("MPESA_SHORTCODE").unwrap_or_default(),
            passkey: env::var("MPESA_PASSKEY").unwrap_or_default(),
            callback_url: format!("{}/payments/mpesa/callback", base_url),
        };

        let paystack = PaystackConfig {
            api_base: env::var("PAYSTACK_API_BASE")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            secret_key: env::var("PAYSTACK_SECRET_KEY").unwrap_or_default(),
            callback_url: format!("{}/payments/paystack/return", base_url),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "sheriapay.db".to_string()),
            base_url,
            operator_token: env::var("OPERATOR_TOKEN").unwrap_or_default(),
            vat_rate_bps: env::var("VAT_RATE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1600),
            signup_fee_cents: env::var("SIGNUP_FEE_CENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50_000),
            mpesa,
            paystack,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
