use serde::{Deserialize, Serialize};

use super::PaymentProvider;

/// Normalized, upsertable mirror of provider-side truth, keyed by
/// (provider, provider_transaction_id). Re-verifications of the same
/// transaction refresh fields and bump `last_seen_at` - never duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTransaction {
    pub id: String,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    pub reference: Option<String>,
    /// Provider-reported status string ("success", "failed", ...).
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub channel: Option<String>,
    pub paid_at: Option<i64>,
    pub raw_payload: String,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
}

/// Data recorded on each successful verification.
#[derive(Debug, Clone)]
pub struct RecordProviderTransaction<'a> {
    pub provider: PaymentProvider,
    pub provider_transaction_id: &'a str,
    pub reference: Option<&'a str>,
    pub status: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub channel: Option<&'a str>,
    pub paid_at: Option<i64>,
    pub raw_payload: &'a str,
}
