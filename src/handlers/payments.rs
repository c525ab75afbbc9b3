//! Initiation, status reads and the client-driven confirm path.

use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{account_from_headers, extract_bearer_token};
use crate::crypto::{random_suffix, secrets_equal};
use crate::db::{queries, AppState};
use crate::engine::{self, ConfirmResult};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::models::{
    Account, CreatePaymentIntent, IntentStatus, PaymentIntent, PaymentProvider, PaymentPurpose,
    ProductKind,
};
use crate::providers::VerifyOutcome;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub purpose: String,
    /// MSISDN for M-Pesa, email for Paystack, free-form for manual.
    pub payer_contact: String,
    pub registration_intent_id: Option<String>,
    pub product_id: Option<String>,
    pub document_id: Option<String>,
    pub institution_id: Option<String>,
    pub duration_months: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub intent_id: String,
    pub status: IntentStatus,
    pub amount_cents: i64,
    pub currency: String,
    /// Paystack hosted checkout URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Paystack gateway reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

fn parse_provider(s: &str) -> Result<PaymentProvider> {
    PaymentProvider::from_str(s).map_err(|_| AppError::BadRequest(msg::INVALID_PROVIDER.into()))
}

fn method_for(provider: PaymentProvider) -> &'static str {
    match provider {
        PaymentProvider::Mpesa => "mobile_money",
        PaymentProvider::Paystack => "card",
        PaymentProvider::ManualTransfer => "eft",
    }
}

/// Server-side pricing: the client never chooses the amount.
fn price_intent(
    conn: &rusqlite::Connection,
    state: &AppState,
    purpose: PaymentPurpose,
    req: &InitiateRequest,
) -> Result<(i64, String)> {
    match purpose {
        PaymentPurpose::SignupFee => Ok((state.signup_fee_cents, "KES".to_string())),
        PaymentPurpose::ProductPurchase => {
            let product_id = req
                .product_id
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("product_id is required".into()))?;
            let product = queries::get_content_product_by_id(conn, product_id)?
                .or_not_found(msg::PRODUCT_NOT_FOUND)?;
            if product.kind != ProductKind::OneTime {
                return Err(AppError::BadRequest(
                    "Product is subscription-only; use a subscription purpose".into(),
                ));
            }
            Ok((product.price_cents, product.currency))
        }
        PaymentPurpose::ProductSubscription | PaymentPurpose::InstitutionSubscription => {
            let product_id = req
                .product_id
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("product_id is required".into()))?;
            let months = req
                .duration_months
                .filter(|m| *m >= 1)
                .ok_or_else(|| AppError::BadRequest("duration_months must be at least 1".into()))?;
            let product = queries::get_content_product_by_id(conn, product_id)?
                .or_not_found(msg::PRODUCT_NOT_FOUND)?;
            if product.kind != ProductKind::Subscription {
                return Err(AppError::BadRequest("Product is not a subscription".into()));
            }
            Ok((product.price_cents * months, product.currency))
        }
        PaymentPurpose::DocumentPurchase => {
            let document_id = req
                .document_id
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("document_id is required".into()))?;
            let document = queries::get_legal_document_by_id(conn, document_id)?
                .or_not_found(msg::DOCUMENT_NOT_FOUND)?;
            Ok((document.price_cents, document.currency))
        }
    }
}

/// Validate the purpose's subject and target references against the caller.
fn validate_subject(
    conn: &rusqlite::Connection,
    purpose: PaymentPurpose,
    account: Option<&Account>,
    req: &InitiateRequest,
) -> Result<()> {
    match purpose {
        PaymentPurpose::SignupFee => {
            let reg_id = req
                .registration_intent_id
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("registration_intent_id is required".into()))?;
            let registration = queries::get_registration_intent_by_id(conn, reg_id)?
                .or_not_found(msg::REGISTRATION_NOT_FOUND)?;
            if registration.completed {
                return Err(AppError::Conflict("Registration already completed".into()));
            }
            Ok(())
        }
        PaymentPurpose::InstitutionSubscription => {
            if account.is_none() {
                return Err(AppError::Unauthorized);
            }
            let institution_id = req
                .institution_id
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("institution_id is required".into()))?;
            queries::get_institution_by_id(conn, institution_id)?
                .or_not_found(msg::INSTITUTION_NOT_FOUND)?;
            Ok(())
        }
        PaymentPurpose::ProductPurchase
        | PaymentPurpose::ProductSubscription
        | PaymentPurpose::DocumentPurchase => {
            if account.is_none() {
                return Err(AppError::Unauthorized);
            }
            Ok(())
        }
    }
}

pub async fn initiate(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(req): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>> {
    let provider = parse_provider(&provider)?;
    let purpose = PaymentPurpose::from_str(&req.purpose)
        .map_err(|_| AppError::BadRequest("Unknown payment purpose".into()))?;

    let account = account_from_headers(&state, &headers)?;

    let intent = {
        let conn = state.db.get()?;
        validate_subject(&conn, purpose, account.as_ref(), &req)?;
        let (amount_cents, currency) = price_intent(&conn, &state, purpose, &req)?;
        if amount_cents <= 0 {
            return Err(AppError::BadRequest(msg::INVALID_AMOUNT.into()));
        }
        // The push API only accepts whole KES; truncating here would charge
        // the payer less than the intent and fail verification afterwards.
        if provider == PaymentProvider::Mpesa && amount_cents % 100 != 0 {
            return Err(AppError::BadRequest(msg::MPESA_WHOLE_AMOUNT.into()));
        }

        let status = match provider {
            PaymentProvider::ManualTransfer => IntentStatus::PendingApproval,
            _ => IntentStatus::Pending,
        };

        queries::create_payment_intent(
            &conn,
            &CreatePaymentIntent {
                provider,
                method: method_for(provider).to_string(),
                purpose,
                status,
                amount_cents,
                currency,
                payer_contact: req.payer_contact.clone(),
                account_id: account.as_ref().map(|a| a.id.clone()),
                institution_id: req.institution_id.clone(),
                registration_intent_id: req.registration_intent_id.clone(),
                product_id: req.product_id.clone(),
                document_id: req.document_id.clone(),
                duration_months: req.duration_months,
            },
        )?
    };

    tracing::info!(
        intent_id = %intent.id,
        provider = provider.as_str(),
        purpose = purpose.as_str(),
        amount_cents = intent.amount_cents,
        "Payment intent created"
    );

    match provider {
        PaymentProvider::Mpesa => initiate_mpesa(&state, intent, &req.payer_contact).await,
        PaymentProvider::Paystack => initiate_paystack(&state, intent, &req.payer_contact).await,
        PaymentProvider::ManualTransfer => Ok(Json(InitiateResponse {
            intent_id: intent.id,
            status: intent.status,
            amount_cents: intent.amount_cents,
            currency: intent.currency,
            checkout_url: None,
            reference: None,
        })),
    }
}

async fn initiate_mpesa(
    state: &AppState,
    intent: PaymentIntent,
    phone: &str,
) -> Result<Json<InitiateResponse>> {
    let description = format!("Sheria {}", intent.purpose);
    let push = state
        .mpesa
        .stk_push(phone, intent.amount_cents, &intent.id, &description)
        .await;

    let conn = state.db.get()?;
    let push = match push {
        Ok(push) => push,
        Err(err) => {
            // A failed initiation is terminal for this intent; the client
            // retries with a fresh one.
            queries::mark_intent_failed(&conn, &intent.id, "initiation_failed")?;
            return Err(err);
        }
    };

    queries::set_intent_push_correlation(
        &conn,
        &intent.id,
        &push.merchant_request_id,
        &push.checkout_request_id,
    )?;

    Ok(Json(InitiateResponse {
        intent_id: intent.id,
        status: intent.status,
        amount_cents: intent.amount_cents,
        currency: intent.currency,
        checkout_url: None,
        reference: None,
    }))
}

async fn initiate_paystack(
    state: &AppState,
    intent: PaymentIntent,
    email: &str,
) -> Result<Json<InitiateResponse>> {
    let reference = format!(
        "SHERIA-{}-{}",
        &intent.id[..8.min(intent.id.len())],
        random_suffix(6)
    );

    // Persist the reference before calling out so a fast webhook can already
    // resolve the intent.
    {
        let conn = state.db.get()?;
        queries::set_intent_provider_reference(&conn, &intent.id, &reference)?;
    }

    let checkout = state
        .paystack
        .initialize_transaction(&reference, email, intent.amount_cents, &intent.currency)
        .await;

    let checkout = match checkout {
        Ok(checkout) => checkout,
        Err(err) => {
            let conn = state.db.get()?;
            queries::mark_intent_failed(&conn, &intent.id, "initiation_failed")?;
            return Err(err);
        }
    };

    Ok(Json(InitiateResponse {
        intent_id: intent.id,
        status: intent.status,
        amount_cents: intent.amount_cents,
        currency: intent.currency,
        checkout_url: Some(checkout.authorization_url),
        reference: Some(reference),
    }))
}

#[derive(Debug, Serialize)]
pub struct IntentView {
    pub id: String,
    pub provider: PaymentProvider,
    pub purpose: PaymentPurpose,
    pub status: IntentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub is_finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    pub created_at: i64,
}

/// Callers may read an intent they own; anonymous reads are allowed only for
/// signup intents, which have no owner until finalization.
fn check_ownership(intent: &PaymentIntent, account: Option<&Account>) -> Result<()> {
    match (&intent.account_id, account) {
        (Some(owner), Some(account)) if *owner == account.id => Ok(()),
        (Some(_), _) => Err(AppError::Forbidden(msg::NOT_INTENT_OWNER.into())),
        (None, _) if intent.purpose.allows_anonymous_confirm() => Ok(()),
        (None, Some(_)) => Ok(()),
        (None, None) => Err(AppError::Unauthorized),
    }
}

pub async fn get_intent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<IntentView>> {
    let account = account_from_headers(&state, &headers)?;
    let conn = state.db.get()?;
    let intent = queries::get_intent_by_id(&conn, &id)?.or_not_found(msg::INTENT_NOT_FOUND)?;

    // Operators may read any intent (manual-transfer review needs it).
    let is_operator = !state.operator_token.is_empty()
        && extract_bearer_token(&headers)
            .map(|t| secrets_equal(t, &state.operator_token))
            .unwrap_or(false);
    if !is_operator {
        check_ownership(&intent, account.as_ref())?;
    }

    let invoice_number = queries::get_invoice_by_intent(&conn, &intent.id)?.map(|i| i.number);

    Ok(Json(IntentView {
        id: intent.id,
        provider: intent.provider,
        purpose: intent.purpose,
        status: intent.status,
        amount_cents: intent.amount_cents,
        currency: intent.currency,
        is_finalized: intent.is_finalized,
        invoice_number,
        failure_reason: intent.failure_reason,
        checkout_request_id: intent.checkout_request_id,
        provider_reference: intent.provider_reference,
        created_at: intent.created_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub intent_id: Option<String>,
    /// Provider-side correlation id: the gateway reference or the push
    /// checkout request id. Either this or `intent_id` must be present.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub intent_id: String,
    pub status: IntentStatus,
    pub is_finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Client-driven reconciliation: fetch the provider's authoritative state
/// and run the same verify-then-finalize sequence as the webhook path. Safe
/// against a racing webhook; both sides are idempotent.
pub async fn confirm(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>> {
    let provider = parse_provider(&provider)?;
    let account = account_from_headers(&state, &headers)?;

    let intent = {
        let conn = state.db.get()?;
        let intent = match (req.intent_id.as_deref(), req.reference.as_deref()) {
            (Some(id), _) => queries::get_intent_by_id(&conn, id)?,
            (None, Some(reference)) => {
                match queries::get_intent_by_provider_reference(&conn, reference)? {
                    Some(intent) => Some(intent),
                    None => queries::get_intent_by_checkout_request(&conn, reference)?,
                }
            }
            (None, None) => {
                return Err(AppError::BadRequest(
                    "intent_id or reference is required".into(),
                ))
            }
        }
        .or_not_found(msg::INTENT_NOT_FOUND)?;
        check_ownership(&intent, account.as_ref())?;
        if intent.provider != provider {
            return Err(AppError::BadRequest(msg::INVALID_PROVIDER.into()));
        }
        intent
    };

    // Only fetch from the provider when the intent could still move.
    let outcome = if intent.status == IntentStatus::Pending {
        fetch_outcome(&state, &intent).await?
    } else {
        None
    };

    let mut conn = state.db.get()?;
    let result = engine::confirm_with_outcome(
        &mut conn,
        &intent.id,
        outcome.as_ref(),
        state.vat_rate_bps,
    )?;

    Ok(Json(confirm_response(intent.id, result)))
}

async fn fetch_outcome(state: &AppState, intent: &PaymentIntent) -> Result<Option<VerifyOutcome>> {
    match intent.provider {
        PaymentProvider::Mpesa => {
            let checkout_request_id = match intent.checkout_request_id.as_deref() {
                Some(id) => id,
                None => return Ok(None),
            };
            let mut outcome = state.mpesa.query_status(checkout_request_id).await?;
            // The status query reports outcome only; the push was placed for
            // the intent's amount.
            outcome.amount_cents = intent.amount_cents;
            outcome.currency = intent.currency.clone();
            Ok(Some(outcome))
        }
        PaymentProvider::Paystack => {
            let reference = match intent.provider_reference.as_deref() {
                Some(r) => r,
                None => return Ok(None),
            };
            Ok(Some(state.paystack.verify_transaction(reference).await?))
        }
        PaymentProvider::ManualTransfer => Ok(None),
    }
}

fn confirm_response(intent_id: String, result: ConfirmResult) -> ConfirmResponse {
    ConfirmResponse {
        intent_id,
        status: result.status,
        is_finalized: result.is_finalized,
        invoice_number: result.invoice_number,
        failure_reason: result.failure_reason,
    }
}
