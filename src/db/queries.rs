use chrono::{DateTime, Months, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::crypto::hash_token;
use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    query_all, query_one, ACCOUNT_COLS, CONTENT_PRODUCT_COLS, DOCUMENT_GRANT_COLS,
    INSTITUTION_COLS, INSTITUTION_SUBSCRIPTION_COLS, INVOICE_COLS, INVOICE_LINE_COLS,
    LEGAL_DOCUMENT_COLS, PAYMENT_INTENT_COLS, PRODUCT_OWNERSHIP_COLS, PROVIDER_TRANSACTION_COLS,
    REGISTRATION_INTENT_COLS, SUBSCRIPTION_COLS, WEBHOOK_EVENT_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Add calendar months to a Unix timestamp.
fn add_months(ts: i64, months: i64) -> Result<i64> {
    let base = DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| AppError::Internal(format!("Invalid timestamp: {}", ts)))?;
    let extended = base
        .checked_add_months(Months::new(months as u32))
        .ok_or_else(|| AppError::Internal(format!("Month overflow: {} + {}", ts, months)))?;
    Ok(extended.timestamp())
}

// ============ Payment intents ============

pub fn create_payment_intent(conn: &Connection, input: &CreatePaymentIntent) -> Result<PaymentIntent> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payment_intents (
            id, provider, method, purpose, status, amount_cents, currency,
            account_id, institution_id, registration_intent_id, product_id,
            document_id, duration_months, payer_contact, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            &id,
            input.provider.as_str(),
            &input.method,
            input.purpose.as_str(),
            input.status.as_str(),
            input.amount_cents,
            &input.currency,
            &input.account_id,
            &input.institution_id,
            &input.registration_intent_id,
            &input.product_id,
            &input.document_id,
            &input.duration_months,
            &input.payer_contact,
            now,
            now
        ],
    )?;

    get_intent_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Intent vanished after insert".into()))
}

pub fn get_intent_by_id(conn: &Connection, id: &str) -> Result<Option<PaymentIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_intents WHERE id = ?1",
            PAYMENT_INTENT_COLS
        ),
        &[&id],
    )
}

pub fn get_intent_by_provider_reference(
    conn: &Connection,
    reference: &str,
) -> Result<Option<PaymentIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_intents WHERE provider_reference = ?1",
            PAYMENT_INTENT_COLS
        ),
        &[&reference],
    )
}

pub fn get_intent_by_checkout_request(
    conn: &Connection,
    checkout_request_id: &str,
) -> Result<Option<PaymentIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_intents WHERE checkout_request_id = ?1",
            PAYMENT_INTENT_COLS
        ),
        &[&checkout_request_id],
    )
}

/// Store the M-Pesa correlation pair returned by the STK push.
pub fn set_intent_push_correlation(
    conn: &Connection,
    id: &str,
    merchant_request_id: &str,
    checkout_request_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payment_intents
         SET merchant_request_id = ?2, checkout_request_id = ?3, updated_at = ?4
         WHERE id = ?1",
        params![id, merchant_request_id, checkout_request_id, now()],
    )?;
    Ok(())
}

/// Store the caller-issued gateway reference. Unique index rejects reuse.
pub fn set_intent_provider_reference(conn: &Connection, id: &str, reference: &str) -> Result<()> {
    conn.execute(
        "UPDATE payment_intents SET provider_reference = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, reference, now()],
    )?;
    Ok(())
}

/// Transition Pending/PendingApproval -> Failed with a reason code.
/// Terminal intents are left untouched; returns whether a row changed.
pub fn mark_intent_failed(conn: &Connection, id: &str, reason: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET status = 'failed', failure_reason = ?2, updated_at = ?3
         WHERE id = ?1 AND status IN ('pending', 'pending_approval')",
        params![id, reason, now()],
    )?;
    Ok(affected > 0)
}

/// Transition Pending -> Success, recording the verified provider fields.
/// Guarded on the current status so a terminal intent can never move.
pub fn mark_intent_success(
    conn: &Connection,
    id: &str,
    provider_transaction_id: &str,
    provider_channel: Option<&str>,
    provider_paid_at: Option<i64>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents
         SET status = 'success', provider_transaction_id = ?2, provider_channel = ?3,
             provider_paid_at = ?4, updated_at = ?5
         WHERE id = ?1 AND status = 'pending'",
        params![id, provider_transaction_id, provider_channel, provider_paid_at, now()],
    )?;
    Ok(affected > 0)
}

/// Claim the finalization latch. Exactly one caller per intent ever gets
/// `true`; the guard and the flip are a single statement.
pub fn try_latch_finalize(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET is_finalized = 1, updated_at = ?2
         WHERE id = ?1 AND status = 'success' AND is_finalized = 0",
        params![id, now()],
    )?;
    Ok(affected > 0)
}

/// Link the minted invoice. Only ever set once (guarded on NULL).
pub fn set_intent_invoice(conn: &Connection, id: &str, invoice_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET invoice_id = ?2, updated_at = ?3
         WHERE id = ?1 AND invoice_id IS NULL",
        params![id, invoice_id, now()],
    )?;
    Ok(affected > 0)
}

/// Attach the account created by a signup-fee finalization to an intent that
/// was initiated anonymously. Never overwrites an existing owner.
pub fn set_intent_account(conn: &Connection, id: &str, account_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE payment_intents SET account_id = ?2, updated_at = ?3
         WHERE id = ?1 AND account_id IS NULL",
        params![id, account_id, now()],
    )?;
    Ok(())
}

/// Append an operator-facing note onto the intent.
pub fn append_admin_note(conn: &Connection, id: &str, note: &str) -> Result<()> {
    let stamped = format!("[{}] {}", Utc::now().to_rfc3339(), note);
    conn.execute(
        "UPDATE payment_intents
         SET admin_notes = CASE
                 WHEN admin_notes IS NULL THEN ?2
                 ELSE admin_notes || char(10) || ?2
             END,
             updated_at = ?3
         WHERE id = ?1",
        params![id, stamped, now()],
    )?;
    Ok(())
}

/// Operator approval of a manual transfer: the only Success transition
/// without provider verification.
pub fn approve_manual_intent(conn: &Connection, id: &str, approved_by: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents
         SET status = 'success', approved_by = ?2, approved_at = ?3, updated_at = ?3
         WHERE id = ?1 AND provider = 'manual_transfer' AND status = 'pending_approval'",
        params![id, approved_by, now()],
    )?;
    Ok(affected > 0)
}

/// Operator rejection of a manual transfer.
pub fn reject_manual_intent(conn: &Connection, id: &str, rejected_by: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents
         SET status = 'cancelled', approved_by = ?2, updated_at = ?3
         WHERE id = ?1 AND provider = 'manual_transfer' AND status = 'pending_approval'",
        params![id, rejected_by, now()],
    )?;
    Ok(affected > 0)
}

// ============ Webhook events ============

/// Insert a webhook delivery record. Returns `None` when an identical
/// delivery (same provider + dedupe hash) was already recorded.
pub fn insert_webhook_event(
    conn: &Connection,
    provider: PaymentProvider,
    dedupe_hash: &str,
    signature_valid: Option<bool>,
    raw_body: &str,
) -> Result<Option<String>> {
    let id = gen_id();
    conn.execute(
        "INSERT OR IGNORE INTO webhook_events
            (id, provider, dedupe_hash, signature_valid, processing_status, raw_body, received_at)
         VALUES (?1, ?2, ?3, ?4, 'received', ?5, ?6)",
        params![&id, provider.as_str(), dedupe_hash, signature_valid, raw_body, now()],
    )?;
    if conn.changes() == 0 {
        return Ok(None);
    }
    Ok(Some(id))
}

/// Record the best-effort parsed event type and reference.
pub fn set_webhook_event_parsed(
    conn: &Connection,
    id: &str,
    event_type: Option<&str>,
    reference: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events SET event_type = ?2, reference = ?3 WHERE id = ?1",
        params![id, event_type, reference],
    )?;
    Ok(())
}

/// Write the final processing status. Every ingestion exit path ends here so
/// an operator can audit why a delivery did or did not act.
pub fn finish_webhook_event(
    conn: &Connection,
    id: &str,
    status: ProcessingStatus,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events
         SET processing_status = ?2, processing_error = ?3, processed_at = ?4
         WHERE id = ?1",
        params![id, status.as_str(), error, now()],
    )?;
    Ok(())
}

pub fn get_webhook_event_by_id(conn: &Connection, id: &str) -> Result<Option<WebhookEvent>> {
    query_one(
        conn,
        &format!("SELECT {} FROM webhook_events WHERE id = ?1", WEBHOOK_EVENT_COLS),
        &[&id],
    )
}

pub fn list_webhook_events(conn: &Connection, provider: PaymentProvider) -> Result<Vec<WebhookEvent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE provider = ?1 ORDER BY received_at",
            WEBHOOK_EVENT_COLS
        ),
        &[&provider.as_str()],
    )
}

// ============ Provider transactions ============

/// Record provider-side truth. First verification inserts; later
/// verifications of the same provider transaction refresh fields and bump
/// `last_seen_at` - never a second row.
pub fn upsert_provider_transaction(
    conn: &Connection,
    rec: &RecordProviderTransaction<'_>,
) -> Result<ProviderTransaction> {
    let now = now();
    conn.execute(
        "INSERT INTO provider_transactions
            (id, provider, provider_transaction_id, reference, status, amount_cents,
             currency, channel, paid_at, raw_payload, first_seen_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
         ON CONFLICT(provider, provider_transaction_id) DO UPDATE SET
             reference = excluded.reference,
             status = excluded.status,
             amount_cents = excluded.amount_cents,
             currency = excluded.currency,
             channel = excluded.channel,
             paid_at = excluded.paid_at,
             raw_payload = excluded.raw_payload,
             last_seen_at = excluded.last_seen_at",
        params![
            gen_id(),
            rec.provider.as_str(),
            rec.provider_transaction_id,
            rec.reference,
            rec.status,
            rec.amount_cents,
            rec.currency,
            rec.channel,
            rec.paid_at,
            rec.raw_payload,
            now
        ],
    )?;

    get_provider_transaction(conn, rec.provider, rec.provider_transaction_id)?
        .ok_or_else(|| AppError::Internal("Provider transaction vanished after upsert".into()))
}

pub fn get_provider_transaction(
    conn: &Connection,
    provider: PaymentProvider,
    provider_transaction_id: &str,
) -> Result<Option<ProviderTransaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM provider_transactions
             WHERE provider = ?1 AND provider_transaction_id = ?2",
            PROVIDER_TRANSACTION_COLS
        ),
        &[&provider.as_str(), &provider_transaction_id],
    )
}

// ============ Invoice sequencing ============

/// Atomically increment and read the per-period counter. The UPDATE both
/// locks the row and returns the new value; there is no read-modify-write
/// window for two finalizations to share.
pub fn next_invoice_number(conn: &Connection, period: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO invoice_sequences (period, last_number) VALUES (?1, 0)",
        params![period],
    )?;
    let n: i64 = conn.query_row(
        "UPDATE invoice_sequences SET last_number = last_number + 1
         WHERE period = ?1 RETURNING last_number",
        params![period],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub struct CreateInvoice<'a> {
    pub number: &'a str,
    pub period: &'a str,
    pub account_id: Option<&'a str>,
    pub institution_id: Option<&'a str>,
    pub intent_id: &'a str,
    pub currency: &'a str,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub gross_cents: i64,
}

pub fn create_invoice(conn: &Connection, input: &CreateInvoice<'_>) -> Result<Invoice> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO invoices
            (id, number, period, status, account_id, institution_id, intent_id,
             currency, net_cents, tax_cents, gross_cents, issued_at)
         VALUES (?1, ?2, ?3, 'issued', ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &id,
            input.number,
            input.period,
            input.account_id,
            input.institution_id,
            input.intent_id,
            input.currency,
            input.net_cents,
            input.tax_cents,
            input.gross_cents,
            now()
        ],
    )?;

    get_invoice_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Invoice vanished after insert".into()))
}

pub fn create_invoice_line(
    conn: &Connection,
    invoice_id: &str,
    description: &str,
    net_cents: i64,
    tax_cents: i64,
    gross_cents: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO invoice_lines
            (id, invoice_id, description, quantity, net_cents, tax_cents, gross_cents)
         VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
        params![gen_id(), invoice_id, description, net_cents, tax_cents, gross_cents],
    )?;
    Ok(())
}

pub fn get_invoice_by_id(conn: &Connection, id: &str) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLS),
        &[&id],
    )
}

pub fn get_invoice_by_intent(conn: &Connection, intent_id: &str) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invoices WHERE intent_id = ?1", INVOICE_COLS),
        &[&intent_id],
    )
}

pub fn list_invoice_lines(conn: &Connection, invoice_id: &str) -> Result<Vec<InvoiceLine>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM invoice_lines WHERE invoice_id = ?1",
            INVOICE_LINE_COLS
        ),
        &[&invoice_id],
    )
}

// ============ Institutions ============

pub fn create_institution(conn: &Connection, name: &str, seat_limit: i64) -> Result<Institution> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO institutions (id, name, seat_limit, seats_reserved, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![&id, name, seat_limit, now()],
    )?;
    get_institution_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Institution vanished after insert".into()))
}

pub fn get_institution_by_id(conn: &Connection, id: &str) -> Result<Option<Institution>> {
    query_one(
        conn,
        &format!("SELECT {} FROM institutions WHERE id = ?1", INSTITUTION_COLS),
        &[&id],
    )
}

/// Opaque seat reservation: one conditional UPDATE. Returns false when the
/// institution is at capacity (seat_limit 0 means unlimited).
pub fn reserve_institution_seat(conn: &Connection, institution_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE institutions SET seats_reserved = seats_reserved + 1
         WHERE id = ?1 AND (seat_limit = 0 OR seats_reserved < seat_limit)",
        params![institution_id],
    )?;
    Ok(affected > 0)
}

// ============ Registrations & accounts ============

pub fn create_registration_intent(
    conn: &Connection,
    input: &CreateRegistrationIntent,
) -> Result<RegistrationIntent> {
    let id = gen_id();
    let email = input.email.trim().to_lowercase();
    conn.execute(
        "INSERT INTO registration_intents (id, email, name, institution_id, completed, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![&id, &email, &input.name, &input.institution_id, now()],
    )?;
    get_registration_intent_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Registration vanished after insert".into()))
}

pub fn get_registration_intent_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<RegistrationIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM registration_intents WHERE id = ?1",
            REGISTRATION_INTENT_COLS
        ),
        &[&id],
    )
}

pub fn mark_registration_completed(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE registration_intents SET completed = 1, completed_at = ?2
         WHERE id = ?1 AND completed = 0",
        params![id, now()],
    )?;
    Ok(())
}

/// Create the account for a completed registration. Insert-or-ignore on the
/// unique registration_intent_id (and email): completing the same
/// registration twice returns the existing account.
pub fn create_account_for_registration(
    conn: &Connection,
    registration: &RegistrationIntent,
) -> Result<Account> {
    conn.execute(
        "INSERT OR IGNORE INTO accounts
            (id, email, name, registration_intent_id, institution_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            gen_id(),
            &registration.email,
            &registration.name,
            &registration.id,
            &registration.institution_id,
            now()
        ],
    )?;
    get_account_by_registration(conn, &registration.id)?
        .ok_or_else(|| AppError::Internal("Account vanished after registration insert".into()))
}

pub fn get_account_by_registration(
    conn: &Connection,
    registration_intent_id: &str,
) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM accounts WHERE registration_intent_id = ?1",
            ACCOUNT_COLS
        ),
        &[&registration_intent_id],
    )
}

pub fn create_account(
    conn: &Connection,
    email: &str,
    name: &str,
    institution_id: Option<&str>,
) -> Result<Account> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO accounts (id, email, name, institution_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, &email.trim().to_lowercase(), name, institution_id, now()],
    )?;
    get_account_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Account vanished after insert".into()))
}

pub fn get_account_by_id(conn: &Connection, id: &str) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLS),
        &[&id],
    )
}

/// Issue a bearer token for an account. Only the hash is stored.
pub fn create_api_token(conn: &Connection, account_id: &str) -> Result<String> {
    let token = format!("sp_{}", Uuid::new_v4().simple());
    conn.execute(
        "INSERT INTO api_tokens (token_hash, account_id, created_at) VALUES (?1, ?2, ?3)",
        params![hash_token(&token), account_id, now()],
    )?;
    Ok(token)
}

pub fn get_account_by_token(conn: &Connection, token: &str) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM accounts
             WHERE id = (SELECT account_id FROM api_tokens WHERE token_hash = ?1)",
            ACCOUNT_COLS
        ),
        &[&hash_token(token)],
    )
}

// ============ Catalog ============

pub fn create_content_product(
    conn: &Connection,
    name: &str,
    kind: ProductKind,
    price_cents: i64,
    currency: &str,
) -> Result<ContentProduct> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO content_products (id, name, kind, price_cents, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, name, kind.as_str(), price_cents, currency, now()],
    )?;
    get_content_product_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Product vanished after insert".into()))
}

pub fn get_content_product_by_id(conn: &Connection, id: &str) -> Result<Option<ContentProduct>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM content_products WHERE id = ?1",
            CONTENT_PRODUCT_COLS
        ),
        &[&id],
    )
}

pub fn create_legal_document(
    conn: &Connection,
    title: &str,
    price_cents: i64,
    currency: &str,
) -> Result<LegalDocument> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO legal_documents (id, title, price_cents, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, title, price_cents, currency, now()],
    )?;
    get_legal_document_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Document vanished after insert".into()))
}

pub fn get_legal_document_by_id(conn: &Connection, id: &str) -> Result<Option<LegalDocument>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM legal_documents WHERE id = ?1",
            LEGAL_DOCUMENT_COLS
        ),
        &[&id],
    )
}

// ============ Fulfillment targets ============

/// Create or extend an account's subscription window by calendar months.
/// Extension appends to the later of now/current expiry, so early renewals
/// never shorten the window and repeating the call extends again (the
/// finalizer latch prevents repeats; this keeps crash recovery additive
/// rather than destructive).
pub fn extend_account_subscription(
    conn: &Connection,
    account_id: &str,
    product_id: Option<&str>,
    months: i64,
) -> Result<i64> {
    let now = now();
    let existing: Option<Subscription> = query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE account_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&account_id],
    )?;

    match existing {
        Some(sub) => {
            let base = sub.expires_at.max(now);
            let new_expiry = add_months(base, months)?;
            conn.execute(
                "UPDATE subscriptions SET expires_at = ?2, product_id = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![&sub.id, new_expiry, product_id, now],
            )?;
            Ok(new_expiry)
        }
        None => {
            let expires_at = add_months(now, months)?;
            conn.execute(
                "INSERT INTO subscriptions
                    (id, account_id, product_id, starts_at, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![gen_id(), account_id, product_id, now, expires_at, now],
            )?;
            Ok(expires_at)
        }
    }
}

pub fn get_subscription_by_account(
    conn: &Connection,
    account_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE account_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&account_id],
    )
}

/// Create or extend an institution's subscription window. Same shape as the
/// individual case.
pub fn extend_institution_subscription(
    conn: &Connection,
    institution_id: &str,
    months: i64,
) -> Result<i64> {
    let now = now();
    let existing: Option<InstitutionSubscription> = query_one(
        conn,
        &format!(
            "SELECT {} FROM institution_subscriptions WHERE institution_id = ?1",
            INSTITUTION_SUBSCRIPTION_COLS
        ),
        &[&institution_id],
    )?;

    match existing {
        Some(sub) => {
            let base = sub.expires_at.max(now);
            let new_expiry = add_months(base, months)?;
            conn.execute(
                "UPDATE institution_subscriptions SET expires_at = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![&sub.id, new_expiry, now],
            )?;
            Ok(new_expiry)
        }
        None => {
            let expires_at = add_months(now, months)?;
            conn.execute(
                "INSERT INTO institution_subscriptions
                    (id, institution_id, starts_at, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![gen_id(), institution_id, now, expires_at, now],
            )?;
            Ok(expires_at)
        }
    }
}

pub fn get_institution_subscription(
    conn: &Connection,
    institution_id: &str,
) -> Result<Option<InstitutionSubscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM institution_subscriptions WHERE institution_id = ?1",
            INSTITUTION_SUBSCRIPTION_COLS
        ),
        &[&institution_id],
    )
}

/// Record a one-time product purchase. A unique-constraint collision means
/// the ownership was already applied; returns whether a row was inserted.
pub fn insert_product_ownership(
    conn: &Connection,
    account_id: &str,
    product_id: &str,
    source_intent_id: &str,
) -> Result<bool> {
    conn.execute(
        "INSERT OR IGNORE INTO product_ownerships
            (id, account_id, product_id, source_intent_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![gen_id(), account_id, product_id, source_intent_id, now()],
    )?;
    Ok(conn.changes() > 0)
}

pub fn get_product_ownership(
    conn: &Connection,
    account_id: &str,
    product_id: &str,
) -> Result<Option<ProductOwnership>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM product_ownerships WHERE account_id = ?1 AND product_id = ?2",
            PRODUCT_OWNERSHIP_COLS
        ),
        &[&account_id, &product_id],
    )
}

/// Grant library access to a purchased document, insert-or-ignore.
pub fn insert_document_grant(
    conn: &Connection,
    account_id: &str,
    document_id: &str,
    source_intent_id: &str,
) -> Result<bool> {
    conn.execute(
        "INSERT OR IGNORE INTO document_grants
            (id, account_id, document_id, source_intent_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![gen_id(), account_id, document_id, source_intent_id, now()],
    )?;
    Ok(conn.changes() > 0)
}

pub fn get_document_grant(
    conn: &Connection,
    account_id: &str,
    document_id: &str,
) -> Result<Option<DocumentGrant>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM document_grants WHERE account_id = ?1 AND document_id = ?2",
            DOCUMENT_GRANT_COLS
        ),
        &[&account_id, &document_id],
    )
}
