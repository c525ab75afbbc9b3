use serde::{Deserialize, Serialize};

/// An individual subscription window. One row per account; a new purchase
/// extends the window rather than inserting a second row, which makes the
/// finalizer's side effect repeatable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub account_id: String,
    pub product_id: Option<String>,
    pub starts_at: i64,
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An institution-wide subscription window. Same create-or-extend shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionSubscription {
    pub id: String,
    pub institution_id: String,
    pub starts_at: i64,
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One-time content-product ownership. UNIQUE(account_id, product_id) -
/// a collision on re-finalization means "already applied", not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOwnership {
    pub id: String,
    pub account_id: String,
    pub product_id: String,
    pub source_intent_id: String,
    pub created_at: i64,
}

/// Library access to a single purchased document.
/// UNIQUE(account_id, document_id), same insert-or-ignore semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentGrant {
    pub id: String,
    pub account_id: String,
    pub document_id: String,
    pub source_intent_id: String,
    pub created_at: i64,
}
