//! Applying a verified provider outcome to the intent state machine.
//!
//! The only transitions here are Pending -> Success and Pending -> Failed,
//! both driven by an authoritative `VerifyOutcome`. Terminal intents never
//! move; a Success that has not yet finalized simply reports Succeeded so
//! the caller proceeds to the finalizer, which has its own latch.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{failure, IntentStatus, PaymentIntent, RecordProviderTransaction};
use crate::providers::VerifyOutcome;

/// What applying a verification did to the intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationApplied {
    /// The intent is Success (moved now, or already was). Finalization may
    /// still be owed.
    Succeeded,
    /// The intent moved to Failed with this reason code.
    Failed { reason: String },
    /// The intent was in a state verification cannot touch.
    Untouched { status: IntentStatus },
}

/// Apply an authoritative outcome to an intent inside one immediate
/// transaction, so two concurrent deliveries for the same intent serialize
/// and the loser re-reads the state the winner wrote.
pub fn apply_verification(
    conn: &mut Connection,
    intent_id: &str,
    outcome: &VerifyOutcome,
) -> Result<VerificationApplied> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let intent = queries::get_intent_by_id(&tx, intent_id)?
        .ok_or_else(|| AppError::NotFound(crate::error::msg::INTENT_NOT_FOUND.into()))?;

    let applied = apply_within(&tx, &intent, outcome)?;

    tx.commit()?;
    Ok(applied)
}

fn apply_within(
    conn: &Connection,
    intent: &PaymentIntent,
    outcome: &VerifyOutcome,
) -> Result<VerificationApplied> {
    match intent.status {
        IntentStatus::Success => {
            // Already verified; a redundant delivery changes nothing but the
            // caller may still owe finalization from an earlier crash.
            return Ok(VerificationApplied::Succeeded);
        }
        IntentStatus::Failed | IntentStatus::Cancelled => {
            tracing::info!(
                intent_id = %intent.id,
                status = intent.status.as_str(),
                "Verification arrived for terminal intent, ignoring"
            );
            return Ok(VerificationApplied::Untouched { status: intent.status });
        }
        IntentStatus::PendingApproval => {
            // Manual transfers only move via operator action.
            return Ok(VerificationApplied::Untouched { status: intent.status });
        }
        IntentStatus::Pending => {}
    }

    if !outcome.successful {
        let reason = if outcome.status.is_empty() {
            "provider_declined".to_string()
        } else {
            outcome.status.clone()
        };
        queries::mark_intent_failed(conn, &intent.id, &reason)?;
        tracing::info!(intent_id = %intent.id, reason = %reason, "Payment failed at provider");
        return Ok(VerificationApplied::Failed { reason });
    }

    // Mirror provider-side truth before any guard can reject, so audits see
    // what the provider actually reported.
    if let Some(txn_id) = outcome.provider_transaction_id.as_deref() {
        queries::upsert_provider_transaction(
            conn,
            &RecordProviderTransaction {
                provider: intent.provider,
                provider_transaction_id: txn_id,
                reference: intent.provider_reference.as_deref(),
                status: &outcome.status,
                amount_cents: outcome.amount_cents,
                currency: &outcome.currency,
                channel: outcome.channel.as_deref(),
                paid_at: outcome.paid_at,
                raw_payload: &outcome.raw_payload,
            },
        )?;
    }

    if outcome.amount_cents != intent.amount_cents {
        queries::mark_intent_failed(conn, &intent.id, failure::AMOUNT_MISMATCH)?;
        queries::append_admin_note(
            conn,
            &intent.id,
            &format!(
                "Provider reported {} but intent expected {} (cents)",
                outcome.amount_cents, intent.amount_cents
            ),
        )?;
        tracing::warn!(
            intent_id = %intent.id,
            expected = intent.amount_cents,
            reported = outcome.amount_cents,
            "Amount mismatch, intent failed"
        );
        return Ok(VerificationApplied::Failed {
            reason: failure::AMOUNT_MISMATCH.to_string(),
        });
    }

    if !outcome.currency.eq_ignore_ascii_case(&intent.currency) {
        queries::mark_intent_failed(conn, &intent.id, failure::CURRENCY_MISMATCH)?;
        queries::append_admin_note(
            conn,
            &intent.id,
            &format!(
                "Provider reported currency {} but intent expected {}",
                outcome.currency, intent.currency
            ),
        )?;
        tracing::warn!(
            intent_id = %intent.id,
            expected = %intent.currency,
            reported = %outcome.currency,
            "Currency mismatch, intent failed"
        );
        return Ok(VerificationApplied::Failed {
            reason: failure::CURRENCY_MISMATCH.to_string(),
        });
    }

    let txn_id = outcome.provider_transaction_id.as_deref().unwrap_or("");
    queries::mark_intent_success(
        conn,
        &intent.id,
        txn_id,
        outcome.channel.as_deref(),
        outcome.paid_at,
    )?;
    tracing::info!(intent_id = %intent.id, "Payment verified successful");
    Ok(VerificationApplied::Succeeded)
}
