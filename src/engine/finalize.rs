//! Exactly-once finalization of a successful payment.
//!
//! The latch flip, the purpose-specific side effect and the invoice mint run
//! inside one immediate transaction. Exactly one caller ever wins the latch;
//! if the side effect fails the whole transaction rolls back, the latch
//! included, so a later retry gets a clean attempt.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{IntentStatus, PaymentIntent, PaymentPurpose};

use super::invoice::mint_invoice_for_intent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This caller won the latch and performed the side effect.
    Finalized { invoice_number: String },
    /// Another caller already finalized; nothing was done.
    AlreadyFinalized,
    /// The intent is not in Success, so there is nothing to finalize.
    NotSuccessful { status: IntentStatus },
}

/// Finalize a successful intent if no one has yet. Safe to call any number
/// of times from any path (webhook, confirm, reconciliation).
pub fn finalize_if_needed(
    conn: &mut Connection,
    intent_id: &str,
    vat_rate_bps: i64,
) -> Result<FinalizeOutcome> {
    let result = finalize_tx(conn, intent_id, vat_rate_bps);

    if let Err(err) = &result {
        // The transaction has rolled back; leave an operator trail on the
        // intent outside of it.
        let note = format!("Finalization failed: {}", err);
        if let Err(note_err) = queries::append_admin_note(conn, intent_id, &note) {
            tracing::error!(intent_id = %intent_id, error = %note_err, "Failed to record finalization note");
        }
        tracing::error!(intent_id = %intent_id, error = %err, "Finalization rolled back");
    }

    result
}

fn finalize_tx(conn: &mut Connection, intent_id: &str, vat_rate_bps: i64) -> Result<FinalizeOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let intent = queries::get_intent_by_id(&tx, intent_id)?
        .ok_or_else(|| AppError::NotFound(crate::error::msg::INTENT_NOT_FOUND.into()))?;

    if intent.status != IntentStatus::Success {
        return Ok(FinalizeOutcome::NotSuccessful { status: intent.status });
    }
    if intent.is_finalized {
        return Ok(FinalizeOutcome::AlreadyFinalized);
    }
    if !queries::try_latch_finalize(&tx, &intent.id)? {
        return Ok(FinalizeOutcome::AlreadyFinalized);
    }

    let fulfilled_account = dispatch(&tx, &intent)?;
    let invoice = mint_invoice_for_intent(&tx, &intent, fulfilled_account.as_deref(), vat_rate_bps)?;

    tx.commit()?;
    tracing::info!(
        intent_id = %intent.id,
        purpose = intent.purpose.as_str(),
        invoice = %invoice.number,
        "Intent finalized"
    );
    Ok(FinalizeOutcome::Finalized {
        invoice_number: invoice.number,
    })
}

/// Perform the purpose-specific side effect. Returns the account that ends
/// up owning the purchase when it differs from the intent's stored owner
/// (signup creates the account here).
fn dispatch(conn: &Connection, intent: &PaymentIntent) -> Result<Option<String>> {
    match intent.purpose {
        PaymentPurpose::SignupFee => {
            let reg_id = intent
                .registration_intent_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Signup intent missing registration".into()))?;
            let registration = queries::get_registration_intent_by_id(conn, reg_id)?
                .ok_or_else(|| AppError::Internal("Registration vanished before finalization".into()))?;

            let account = queries::create_account_for_registration(conn, &registration)?;
            queries::mark_registration_completed(conn, reg_id)?;
            queries::set_intent_account(conn, &intent.id, &account.id)?;

            if let Some(institution_id) = registration.institution_id.as_deref() {
                if !queries::reserve_institution_seat(conn, institution_id)? {
                    // Registration still completes; operators sort out the
                    // seat shortfall rather than stranding a paid intent.
                    queries::append_admin_note(
                        conn,
                        &intent.id,
                        &format!("Institution {} is at seat capacity", institution_id),
                    )?;
                    tracing::warn!(
                        intent_id = %intent.id,
                        institution_id = %institution_id,
                        "Seat reservation failed at capacity"
                    );
                }
            }
            Ok(Some(account.id))
        }
        PaymentPurpose::ProductPurchase => {
            let account_id = intent
                .account_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Purchase intent missing account".into()))?;
            let product_id = intent
                .product_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Purchase intent missing product".into()))?;
            queries::insert_product_ownership(conn, account_id, product_id, &intent.id)?;
            Ok(None)
        }
        PaymentPurpose::ProductSubscription => {
            let account_id = intent
                .account_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Subscription intent missing account".into()))?;
            let months = intent
                .duration_months
                .ok_or_else(|| AppError::Internal("Subscription intent missing duration".into()))?;
            queries::extend_account_subscription(conn, account_id, intent.product_id.as_deref(), months)?;
            Ok(None)
        }
        PaymentPurpose::InstitutionSubscription => {
            let institution_id = intent
                .institution_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Institution intent missing institution".into()))?;
            let months = intent
                .duration_months
                .ok_or_else(|| AppError::Internal("Institution intent missing duration".into()))?;
            queries::extend_institution_subscription(conn, institution_id, months)?;
            Ok(None)
        }
        PaymentPurpose::DocumentPurchase => {
            let account_id = intent
                .account_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Document intent missing account".into()))?;
            let document_id = intent
                .document_id
                .as_deref()
                .ok_or_else(|| AppError::Internal("Document intent missing document".into()))?;
            queries::insert_document_grant(conn, account_id, document_id, &intent.id)?;
            Ok(None)
        }
    }
}
