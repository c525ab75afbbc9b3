//! Webhook ingestion: record first, deduplicate, then decide.
//!
//! Every inbound delivery is written to `webhook_events` before any business
//! logic runs. Deduplication keys on a content hash of the raw body scoped
//! per provider, so a provider retrying the same delivery (or an attacker
//! replaying it) collapses onto the original row and never acts twice.

use sha2::{Digest, Sha256};

use crate::db::queries;
use crate::error::Result;
use crate::models::{PaymentProvider, ProcessingStatus};

/// Content hash of a delivery: SHA-256 over `provider || 0x00 || raw_body`,
/// hex-encoded. The separator keeps provider and body from ambiguously
/// concatenating; scoping by provider means two providers posting identical
/// bytes still record separately.
pub fn dedupe_hash(provider: PaymentProvider, raw_body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_body);
    hex::encode(hasher.finalize())
}

/// Outcome of recording one delivery.
#[derive(Debug, Clone)]
pub enum Ingested {
    /// This exact delivery was already recorded; nothing more to do.
    Duplicate,
    /// Recorded but the signature did not validate; the event row is already
    /// marked Ignored. Respond 200 and stop.
    SignatureRejected { event_id: String },
    /// Newly recorded and eligible for processing.
    Accepted { event_id: String },
}

/// Record a delivery. `signature_valid` is `None` for providers whose
/// callbacks are unsigned (the push provider), `Some(result)` otherwise.
///
/// Validation happens before business logic but the delivery is stored
/// either way: a rejected signature still leaves an audit row.
pub fn ingest(
    conn: &rusqlite::Connection,
    provider: PaymentProvider,
    raw_body: &str,
    signature_valid: Option<bool>,
) -> Result<Ingested> {
    let hash = dedupe_hash(provider, raw_body.as_bytes());

    let event_id = match queries::insert_webhook_event(conn, provider, &hash, signature_valid, raw_body)? {
        Some(id) => id,
        None => {
            tracing::info!(provider = provider.as_str(), "Duplicate webhook delivery ignored");
            return Ok(Ingested::Duplicate);
        }
    };

    if signature_valid == Some(false) {
        tracing::warn!(
            provider = provider.as_str(),
            event_id = %event_id,
            "Webhook signature validation failed"
        );
        queries::finish_webhook_event(
            conn,
            &event_id,
            ProcessingStatus::Ignored,
            Some("invalid signature"),
        )?;
        return Ok(Ingested::SignatureRejected { event_id });
    }

    Ok(Ingested::Accepted { event_id })
}
