//! Inbound provider notifications.
//!
//! Both handlers follow the same contract: record the delivery first, answer
//! 200 once it is durably recorded, and push every exit through
//! `finish_webhook_event` so the event row always says what happened.
//! Processing failures still answer 200; recovery happens through the
//! confirm/reconciliation path, not provider retries (which the dedupe store
//! would drop anyway).

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use rusqlite::Connection;

use crate::db::{queries, AppState};
use crate::engine::{self, Ingested};
use crate::error::Result;
use crate::models::{PaymentProvider, ProcessingStatus};
use crate::providers::{self, VerifyOutcome};

/// Run verify-then-finalize for an event that resolved to an intent, then
/// close out the event row.
fn process_for_intent(
    conn: &mut Connection,
    event_id: &str,
    intent_id: &str,
    outcome: &VerifyOutcome,
    vat_rate_bps: i64,
) -> Result<()> {
    let result = engine::confirm_with_outcome(conn, intent_id, Some(outcome), vat_rate_bps);
    match &result {
        Ok(_) => queries::finish_webhook_event(conn, event_id, ProcessingStatus::Processed, None)?,
        Err(err) => {
            queries::finish_webhook_event(
                conn,
                event_id,
                ProcessingStatus::Failed,
                Some(&err.to_string()),
            )?;
        }
    }
    result.map(|_| ())
}

/// M-Pesa STK callback. Unsigned; the body itself is the authoritative
/// result.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let raw_body = match std::str::from_utf8(&body) {
        Ok(s) => s.to_string(),
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid UTF-8 body"),
    };

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("M-Pesa callback: no DB connection: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let event_id = match engine::ingest(&conn, PaymentProvider::Mpesa, &raw_body, None) {
        Ok(Ingested::Accepted { event_id }) => event_id,
        Ok(Ingested::Duplicate) => return (StatusCode::OK, "Duplicate"),
        Ok(Ingested::SignatureRejected { .. }) => return (StatusCode::OK, "Ignored"),
        Err(e) => {
            tracing::error!("M-Pesa callback: failed to record event: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let callback = match providers::parse_push_callback(&raw_body) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!(event_id = %event_id, "Unparseable M-Pesa callback: {}", e);
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Failed,
                Some("unparseable callback body"),
            );
            return (StatusCode::OK, "Recorded");
        }
    };

    if let Err(e) = queries::set_webhook_event_parsed(
        &conn,
        &event_id,
        Some("stk_callback"),
        Some(&callback.checkout_request_id),
    ) {
        tracing::error!(event_id = %event_id, "Failed to annotate event: {}", e);
    }

    let intent = match queries::get_intent_by_checkout_request(&conn, &callback.checkout_request_id)
    {
        Ok(Some(intent)) => intent,
        Ok(None) => {
            tracing::warn!(
                checkout_request_id = %callback.checkout_request_id,
                "M-Pesa callback with no matching intent"
            );
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Ignored,
                Some("no matching intent"),
            );
            return (StatusCode::OK, "Recorded");
        }
        Err(e) => {
            tracing::error!("M-Pesa callback: intent lookup failed: {}", e);
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Failed,
                Some("intent lookup failed"),
            );
            return (StatusCode::OK, "Recorded");
        }
    };

    // Failure callbacks carry no metadata; the amounts only matter on the
    // success path, where the callback reports what was actually paid.
    let mut outcome = callback.outcome;
    if !outcome.successful {
        outcome.amount_cents = intent.amount_cents;
        outcome.currency = intent.currency.clone();
    }

    if let Err(e) =
        process_for_intent(&mut conn, &event_id, &intent.id, &outcome, state.vat_rate_bps)
    {
        tracing::error!(intent_id = %intent.id, "M-Pesa callback processing failed: {}", e);
    }

    (StatusCode::OK, "Recorded")
}

/// Paystack webhook. Signature-checked, then re-verified server-side; the
/// webhook body itself never drives a state change.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let raw_body = match std::str::from_utf8(&body) {
        Ok(s) => s.to_string(),
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid UTF-8 body"),
    };

    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let signature_valid = match state.paystack.verify_webhook_signature(&body, signature) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!("Paystack signature verification error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Paystack webhook: no DB connection: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let event_id = match engine::ingest(
        &conn,
        PaymentProvider::Paystack,
        &raw_body,
        Some(signature_valid),
    ) {
        Ok(Ingested::Accepted { event_id }) => event_id,
        Ok(Ingested::Duplicate) => return (StatusCode::OK, "Duplicate"),
        Ok(Ingested::SignatureRejected { .. }) => return (StatusCode::OK, "Recorded"),
        Err(e) => {
            tracing::error!("Paystack webhook: failed to record event: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let (event_type, reference) = providers::parse_webhook_hint(&raw_body);
    if let Err(e) = queries::set_webhook_event_parsed(
        &conn,
        &event_id,
        event_type.as_deref(),
        reference.as_deref(),
    ) {
        tracing::error!(event_id = %event_id, "Failed to annotate event: {}", e);
    }

    if event_type.as_deref() != Some("charge.success") {
        let _ = queries::finish_webhook_event(
            &conn,
            &event_id,
            ProcessingStatus::Ignored,
            Some("unhandled event type"),
        );
        return (StatusCode::OK, "Recorded");
    }

    let reference = match reference {
        Some(r) => r,
        None => {
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Ignored,
                Some("missing reference"),
            );
            return (StatusCode::OK, "Recorded");
        }
    };

    let intent = match queries::get_intent_by_provider_reference(&conn, &reference) {
        Ok(Some(intent)) => intent,
        Ok(None) => {
            tracing::warn!(reference = %reference, "Paystack webhook with no matching intent");
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Ignored,
                Some("no matching intent"),
            );
            return (StatusCode::OK, "Recorded");
        }
        Err(e) => {
            tracing::error!("Paystack webhook: intent lookup failed: {}", e);
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Failed,
                Some("intent lookup failed"),
            );
            return (StatusCode::OK, "Recorded");
        }
    };

    // The webhook is only a hint; this call is the source of truth.
    let outcome = match state.paystack.verify_transaction(&reference).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(reference = %reference, "Paystack verify failed: {}", e);
            let _ = queries::finish_webhook_event(
                &conn,
                &event_id,
                ProcessingStatus::Failed,
                Some("verify call failed"),
            );
            return (StatusCode::OK, "Recorded");
        }
    };

    if let Err(e) =
        process_for_intent(&mut conn, &event_id, &intent.id, &outcome, state.vat_rate_bps)
    {
        tracing::error!(intent_id = %intent.id, "Paystack webhook processing failed: {}", e);
    }

    (StatusCode::OK, "Recorded")
}
