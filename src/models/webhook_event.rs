use serde::{Deserialize, Serialize};

use super::PaymentProvider;

/// Final disposition of an ingested webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Received,
    Processed,
    Failed,
    /// Not an error - unauthenticated, unrecognized, or irrelevant payloads.
    Ignored,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "ignored" => Ok(Self::Ignored),
            _ => Err(()),
        }
    }
}

/// Append-only record of one physical webhook delivery attempt.
///
/// `dedupe_hash` is unique per provider: a retried delivery with an
/// identical body collides and is dropped before any business logic runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub provider: PaymentProvider,
    /// Best-effort parsed event type (e.g. "charge.success", "stk_callback").
    pub event_type: Option<String>,
    /// Best-effort parsed provider reference.
    pub reference: Option<String>,
    pub dedupe_hash: String,
    /// NULL for providers that do not sign notifications.
    pub signature_valid: Option<bool>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub raw_body: String,
    pub received_at: i64,
    pub processed_at: Option<i64>,
}
