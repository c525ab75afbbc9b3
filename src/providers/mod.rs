mod mpesa;
mod paystack;

pub use mpesa::*;
pub use paystack::*;

/// Authoritative outcome of a provider-side verification, normalized across
/// providers. Produced either by parsing a push callback (M-Pesa, whose
/// callback carries the result) or by a mandatory server-side verify call
/// (Paystack, whose webhook body is never trusted).
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub successful: bool,
    pub amount_cents: i64,
    pub currency: String,
    pub provider_transaction_id: Option<String>,
    pub channel: Option<String>,
    pub paid_at: Option<i64>,
    /// Provider-reported status text, kept for diagnostics.
    pub status: String,
    /// Raw provider payload for the provider-transaction mirror.
    pub raw_payload: String,
}
