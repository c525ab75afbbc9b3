//! Operator actions on manual bank/EFT transfers.
//!
//! Approval is the one Success transition that happens without provider
//! verification, so it is guarded twice: the route sits behind the operator
//! token, and the UPDATE itself only fires for a manual intent still in
//! PendingApproval.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::engine;
use crate::error::{msg, AppError, OptionExt, Result};
use crate::models::{IntentStatus, PaymentIntent, PaymentProvider};

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    /// Operator identifier recorded on the intent.
    pub operator: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub intent_id: String,
    pub status: IntentStatus,
    pub is_finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
}

fn load_manual_intent(conn: &rusqlite::Connection, id: &str) -> Result<PaymentIntent> {
    let intent = queries::get_intent_by_id(conn, id)?.or_not_found(msg::INTENT_NOT_FOUND)?;
    if intent.provider != PaymentProvider::ManualTransfer {
        return Err(AppError::BadRequest(msg::NOT_MANUAL_INTENT.into()));
    }
    Ok(intent)
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> Result<Json<ApprovalResponse>> {
    let mut conn = state.db.get()?;
    let intent = load_manual_intent(&conn, &id)?;

    if !queries::approve_manual_intent(&conn, &intent.id, &req.operator)? {
        return Err(AppError::Conflict(msg::NOT_PENDING_APPROVAL.into()));
    }
    if let Some(note) = req.note.as_deref() {
        queries::append_admin_note(&conn, &intent.id, note)?;
    }
    tracing::info!(intent_id = %intent.id, operator = %req.operator, "Manual transfer approved");

    let invoice_number = match engine::finalize_if_needed(&mut conn, &intent.id, state.vat_rate_bps)? {
        engine::FinalizeOutcome::Finalized { invoice_number } => Some(invoice_number),
        _ => None,
    };

    let fresh = queries::get_intent_by_id(&conn, &intent.id)?.or_not_found(msg::INTENT_NOT_FOUND)?;
    Ok(Json(ApprovalResponse {
        intent_id: fresh.id,
        status: fresh.status,
        is_finalized: fresh.is_finalized,
        invoice_number,
    }))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> Result<Json<ApprovalResponse>> {
    let conn = state.db.get()?;
    let intent = load_manual_intent(&conn, &id)?;

    if !queries::reject_manual_intent(&conn, &intent.id, &req.operator)? {
        return Err(AppError::Conflict(msg::NOT_PENDING_APPROVAL.into()));
    }
    if let Some(note) = req.note.as_deref() {
        queries::append_admin_note(&conn, &intent.id, note)?;
    }
    tracing::info!(intent_id = %intent.id, operator = %req.operator, "Manual transfer rejected");

    let fresh = queries::get_intent_by_id(&conn, &intent.id)?.or_not_found(msg::INTENT_NOT_FOUND)?;
    Ok(Json(ApprovalResponse {
        intent_id: fresh.id,
        status: fresh.status,
        is_finalized: fresh.is_finalized,
        invoice_number: None,
    }))
}
