use serde::{Deserialize, Serialize};

/// A legally numbered invoice, created only for Success intents.
/// At most one invoice exists per intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    /// Sequential display number, e.g. "INV-2025-000001".
    pub number: String,
    /// Accounting period key (calendar year).
    pub period: String,
    pub status: String,
    pub account_id: Option<String>,
    pub institution_id: Option<String>,
    pub intent_id: String,
    pub currency: String,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub gross_cents: i64,
    pub issued_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    pub description: String,
    pub quantity: i64,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub gross_cents: i64,
}
