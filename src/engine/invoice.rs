//! Invoice minting: one gapless, strictly sequential number per finalized
//! intent, VAT split out tax-inclusively.

use chrono::{Datelike, Utc};
use rusqlite::Connection;

use crate::db::queries::{self, CreateInvoice};
use crate::error::Result;
use crate::models::{Invoice, PaymentIntent, PaymentPurpose};
use crate::tax;

/// Current numbering period, one counter per calendar year.
pub fn current_period() -> String {
    Utc::now().year().to_string()
}

pub fn format_number(period: &str, n: i64) -> String {
    format!("INV-{}-{:06}", period, n)
}

fn line_description(intent: &PaymentIntent) -> String {
    match intent.purpose {
        PaymentPurpose::SignupFee => "Account registration fee".to_string(),
        PaymentPurpose::ProductPurchase => format!(
            "Content product purchase ({})",
            intent.product_id.as_deref().unwrap_or("unknown")
        ),
        PaymentPurpose::ProductSubscription => format!(
            "Subscription, {} month(s)",
            intent.duration_months.unwrap_or(0)
        ),
        PaymentPurpose::InstitutionSubscription => format!(
            "Institution subscription, {} month(s)",
            intent.duration_months.unwrap_or(0)
        ),
        PaymentPurpose::DocumentPurchase => format!(
            "Document purchase ({})",
            intent.document_id.as_deref().unwrap_or("unknown")
        ),
    }
}

/// Mint the invoice for a finalized intent, if it does not already have one.
/// Runs inside the caller's transaction: the sequence increment, the invoice
/// row and the intent link all commit or roll back together, which is what
/// keeps the numbering gapless.
///
/// `account_id` may override the intent's stored owner (signup finalization
/// creates the account mid-flight).
pub fn mint_invoice_for_intent(
    conn: &Connection,
    intent: &PaymentIntent,
    account_id: Option<&str>,
    vat_rate_bps: i64,
) -> Result<Invoice> {
    if let Some(existing) = queries::get_invoice_by_intent(conn, &intent.id)? {
        return Ok(existing);
    }

    let period = current_period();
    let n = queries::next_invoice_number(conn, &period)?;
    let number = format_number(&period, n);

    let split = tax::breakdown(intent.amount_cents, vat_rate_bps);
    let owner = account_id.or(intent.account_id.as_deref());

    let invoice = queries::create_invoice(
        conn,
        &CreateInvoice {
            number: &number,
            period: &period,
            account_id: owner,
            institution_id: intent.institution_id.as_deref(),
            intent_id: &intent.id,
            currency: &intent.currency,
            net_cents: split.net_cents,
            tax_cents: split.tax_cents,
            gross_cents: split.gross_cents,
        },
    )?;
    queries::create_invoice_line(
        conn,
        &invoice.id,
        &line_description(intent),
        split.net_cents,
        split.tax_cents,
        split.gross_cents,
    )?;
    queries::set_intent_invoice(conn, &intent.id, &invoice.id)?;

    tracing::info!(intent_id = %intent.id, number = %number, "Invoice issued");
    Ok(invoice)
}
