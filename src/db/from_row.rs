//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PAYMENT_INTENT_COLS: &str = "id, provider, method, purpose, status, amount_cents, currency, checkout_request_id, merchant_request_id, provider_reference, provider_transaction_id, provider_channel, provider_paid_at, is_finalized, invoice_id, failure_reason, admin_notes, approved_by, approved_at, account_id, institution_id, registration_intent_id, product_id, document_id, duration_months, payer_contact, created_at, updated_at";

pub const WEBHOOK_EVENT_COLS: &str = "id, provider, event_type, reference, dedupe_hash, signature_valid, processing_status, processing_error, raw_body, received_at, processed_at";

pub const PROVIDER_TRANSACTION_COLS: &str = "id, provider, provider_transaction_id, reference, status, amount_cents, currency, channel, paid_at, raw_payload, first_seen_at, last_seen_at";

pub const INVOICE_COLS: &str = "id, number, period, status, account_id, institution_id, intent_id, currency, net_cents, tax_cents, gross_cents, issued_at";

pub const INVOICE_LINE_COLS: &str =
    "id, invoice_id, description, quantity, net_cents, tax_cents, gross_cents";

pub const ACCOUNT_COLS: &str =
    "id, email, name, registration_intent_id, institution_id, created_at";

pub const REGISTRATION_INTENT_COLS: &str =
    "id, email, name, institution_id, completed, created_at, completed_at";

pub const INSTITUTION_COLS: &str = "id, name, seat_limit, seats_reserved, created_at";

pub const CONTENT_PRODUCT_COLS: &str = "id, name, kind, price_cents, currency, created_at";

pub const LEGAL_DOCUMENT_COLS: &str = "id, title, price_cents, currency, created_at";

pub const SUBSCRIPTION_COLS: &str =
    "id, account_id, product_id, starts_at, expires_at, created_at, updated_at";

pub const INSTITUTION_SUBSCRIPTION_COLS: &str =
    "id, institution_id, starts_at, expires_at, created_at, updated_at";

pub const PRODUCT_OWNERSHIP_COLS: &str =
    "id, account_id, product_id, source_intent_id, created_at";

pub const DOCUMENT_GRANT_COLS: &str = "id, account_id, document_id, source_intent_id, created_at";

// ============ FromRow Implementations ============

impl FromRow for PaymentIntent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentIntent {
            id: row.get(0)?,
            provider: parse_enum(row, 1, "provider")?,
            method: row.get(2)?,
            purpose: parse_enum(row, 3, "purpose")?,
            status: parse_enum(row, 4, "status")?,
            amount_cents: row.get(5)?,
            currency: row.get(6)?,
            checkout_request_id: row.get(7)?,
            merchant_request_id: row.get(8)?,
            provider_reference: row.get(9)?,
            provider_transaction_id: row.get(10)?,
            provider_channel: row.get(11)?,
            provider_paid_at: row.get(12)?,
            is_finalized: row.get(13)?,
            invoice_id: row.get(14)?,
            failure_reason: row.get(15)?,
            admin_notes: row.get(16)?,
            approved_by: row.get(17)?,
            approved_at: row.get(18)?,
            account_id: row.get(19)?,
            institution_id: row.get(20)?,
            registration_intent_id: row.get(21)?,
            product_id: row.get(22)?,
            document_id: row.get(23)?,
            duration_months: row.get(24)?,
            payer_contact: row.get(25)?,
            created_at: row.get(26)?,
            updated_at: row.get(27)?,
        })
    }
}

impl FromRow for WebhookEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEvent {
            id: row.get(0)?,
            provider: parse_enum(row, 1, "provider")?,
            event_type: row.get(2)?,
            reference: row.get(3)?,
            dedupe_hash: row.get(4)?,
            signature_valid: row.get(5)?,
            processing_status: parse_enum(row, 6, "processing_status")?,
            processing_error: row.get(7)?,
            raw_body: row.get(8)?,
            received_at: row.get(9)?,
            processed_at: row.get(10)?,
        })
    }
}

impl FromRow for ProviderTransaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProviderTransaction {
            id: row.get(0)?,
            provider: parse_enum(row, 1, "provider")?,
            provider_transaction_id: row.get(2)?,
            reference: row.get(3)?,
            status: row.get(4)?,
            amount_cents: row.get(5)?,
            currency: row.get(6)?,
            channel: row.get(7)?,
            paid_at: row.get(8)?,
            raw_payload: row.get(9)?,
            first_seen_at: row.get(10)?,
            last_seen_at: row.get(11)?,
        })
    }
}

impl FromRow for Invoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: row.get(0)?,
            number: row.get(1)?,
            period: row.get(2)?,
            status: row.get(3)?,
            account_id: row.get(4)?,
            institution_id: row.get(5)?,
            intent_id: row.get(6)?,
            currency: row.get(7)?,
            net_cents: row.get(8)?,
            tax_cents: row.get(9)?,
            gross_cents: row.get(10)?,
            issued_at: row.get(11)?,
        })
    }
}

impl FromRow for InvoiceLine {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(InvoiceLine {
            id: row.get(0)?,
            invoice_id: row.get(1)?,
            description: row.get(2)?,
            quantity: row.get(3)?,
            net_cents: row.get(4)?,
            tax_cents: row.get(5)?,
            gross_cents: row.get(6)?,
        })
    }
}

impl FromRow for Account {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Account {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            registration_intent_id: row.get(3)?,
            institution_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for RegistrationIntent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RegistrationIntent {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            institution_id: row.get(3)?,
            completed: row.get(4)?,
            created_at: row.get(5)?,
            completed_at: row.get(6)?,
        })
    }
}

impl FromRow for Institution {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Institution {
            id: row.get(0)?,
            name: row.get(1)?,
            seat_limit: row.get(2)?,
            seats_reserved: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for ContentProduct {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ContentProduct {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            price_cents: row.get(3)?,
            currency: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for LegalDocument {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LegalDocument {
            id: row.get(0)?,
            title: row.get(1)?,
            price_cents: row.get(2)?,
            currency: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            account_id: row.get(1)?,
            product_id: row.get(2)?,
            starts_at: row.get(3)?,
            expires_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for InstitutionSubscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(InstitutionSubscription {
            id: row.get(0)?,
            institution_id: row.get(1)?,
            starts_at: row.get(2)?,
            expires_at: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for ProductOwnership {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProductOwnership {
            id: row.get(0)?,
            account_id: row.get(1)?,
            product_id: row.get(2)?,
            source_intent_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for DocumentGrant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DocumentGrant {
            id: row.get(0)?,
            account_id: row.get(1)?,
            document_id: row.get(2)?,
            source_intent_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
