use serde::{Deserialize, Serialize};

/// A subscriber account. Created either directly or by the finalizer
/// completing a paid registration intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Set when the account was created from a completed registration;
    /// unique, which makes registration completion insert-or-ignore.
    pub registration_intent_id: Option<String>,
    pub institution_id: Option<String>,
    pub created_at: i64,
}

/// A validated-but-unpaid registration, completed by a successful
/// signup-fee payment. Field validation and institution access-code checks
/// happen upstream; the engine only consumes the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationIntent {
    pub id: String,
    pub email: String,
    pub name: String,
    pub institution_id: Option<String>,
    pub completed: bool,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRegistrationIntent {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub institution_id: Option<String>,
}
