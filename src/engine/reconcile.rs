//! The shared verify-then-finalize sequence.
//!
//! Both the webhook processors and the client-driven confirm endpoint funnel
//! through here: apply an authoritative outcome if the intent is still
//! Pending, then finalize if the intent is Success and unfinalized. Every
//! branch is idempotent, so a delayed webhook racing a confirm poll is safe.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::IntentStatus;
use crate::providers::VerifyOutcome;

use super::finalize::{finalize_if_needed, FinalizeOutcome};
use super::lifecycle::{apply_verification, VerificationApplied};

/// What the caller can report back after reconciling an intent.
#[derive(Debug, Clone)]
pub struct ConfirmResult {
    pub status: IntentStatus,
    pub is_finalized: bool,
    pub invoice_number: Option<String>,
    pub failure_reason: Option<String>,
}

/// Reconcile an intent against a freshly fetched provider outcome (`None`
/// when no authoritative outcome is available, e.g. a manual transfer still
/// awaiting approval).
pub fn confirm_with_outcome(
    conn: &mut Connection,
    intent_id: &str,
    outcome: Option<&VerifyOutcome>,
    vat_rate_bps: i64,
) -> Result<ConfirmResult> {
    let intent = queries::get_intent_by_id(conn, intent_id)?
        .ok_or_else(|| AppError::NotFound(crate::error::msg::INTENT_NOT_FOUND.into()))?;

    let proceed_to_finalize = match intent.status {
        IntentStatus::Success => true,
        IntentStatus::Failed | IntentStatus::Cancelled | IntentStatus::PendingApproval => false,
        IntentStatus::Pending => match outcome {
            Some(outcome) => matches!(
                apply_verification(conn, intent_id, outcome)?,
                VerificationApplied::Succeeded
            ),
            None => false,
        },
    };

    let mut invoice_number = None;
    if proceed_to_finalize {
        match finalize_if_needed(conn, intent_id, vat_rate_bps)? {
            FinalizeOutcome::Finalized { invoice_number: number } => invoice_number = Some(number),
            FinalizeOutcome::AlreadyFinalized | FinalizeOutcome::NotSuccessful { .. } => {}
        }
    }

    // Re-read so the response reflects whatever this call (or a racing one)
    // actually wrote.
    let fresh = queries::get_intent_by_id(conn, intent_id)?
        .ok_or_else(|| AppError::NotFound(crate::error::msg::INTENT_NOT_FOUND.into()))?;
    let invoice_number = match invoice_number {
        Some(n) => Some(n),
        None => queries::get_invoice_by_intent(conn, intent_id)?.map(|i| i.number),
    };

    Ok(ConfirmResult {
        status: fresh.status,
        is_finalized: fresh.is_finalized,
        invoice_number,
        failure_reason: fresh.failure_reason,
    })
}
