use serde::{Deserialize, Serialize};

/// Payment provider handling an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// M-Pesa STK push. The asynchronous callback carries the authoritative
    /// result; callbacks are not signed.
    Mpesa,
    /// Paystack hosted checkout. Webhooks are HMAC-signed and never trusted;
    /// every webhook triggers a server-side verify call.
    Paystack,
    /// Bank/EFT transfer recorded by the payer, approved by an operator.
    ManualTransfer,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpesa => "mpesa",
            Self::Paystack => "paystack",
            Self::ManualTransfer => "manual_transfer",
        }
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpesa" => Ok(Self::Mpesa),
            "paystack" => Ok(Self::Paystack),
            "manual_transfer" | "manual" => Ok(Self::ManualTransfer),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a successful payment pays for. Selects the finalizer branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    /// Completes a pending registration into a real account.
    SignupFee,
    /// One-time purchase of a content product.
    ProductPurchase,
    /// Creates or extends an individual subscription window.
    ProductSubscription,
    /// Creates or extends an institution subscription window.
    InstitutionSubscription,
    /// Grants library access to a single legal document.
    DocumentPurchase,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignupFee => "signup_fee",
            Self::ProductPurchase => "product_purchase",
            Self::ProductSubscription => "product_subscription",
            Self::InstitutionSubscription => "institution_subscription",
            Self::DocumentPurchase => "document_purchase",
        }
    }

    /// Purposes that may be confirmed without authentication (the paying
    /// subject has no account yet).
    pub fn allows_anonymous_confirm(&self) -> bool {
        matches!(self, Self::SignupFee)
    }
}

impl std::str::FromStr for PaymentPurpose {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup_fee" => Ok(Self::SignupFee),
            "product_purchase" => Ok(Self::ProductPurchase),
            "product_subscription" => Ok(Self::ProductSubscription),
            "institution_subscription" => Ok(Self::InstitutionSubscription),
            "document_purchase" => Ok(Self::DocumentPurchase),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment intent state machine.
///
/// `Success`, `Failed` and `Cancelled` are terminal for the payment
/// dimension; `is_finalized` is an independent one-way latch layered on
/// top of `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    PendingApproval,
    Success,
    Failed,
    Cancelled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingApproval => "pending_approval",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for IntentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_approval" => Ok(Self::PendingApproval),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason codes for forced failures. Stored as text on the intent.
pub mod failure {
    pub const AMOUNT_MISMATCH: &str = "amount_mismatch";
    pub const CURRENCY_MISMATCH: &str = "currency_mismatch";
}

/// The aggregate root: a record of an attempted payment, created before the
/// outcome is known. Amount and currency are immutable after creation; any
/// later verification must match them exactly or the intent is forced to
/// Failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub provider: PaymentProvider,
    /// Redundant display classification ("mobile_money", "card", "eft").
    pub method: String,
    pub purpose: PaymentPurpose,
    pub status: IntentStatus,

    // Immutable after creation.
    pub amount_cents: i64,
    pub currency: String,

    // Provider correlation identifiers.
    /// M-Pesa checkout request id (set by the provider at initiation).
    pub checkout_request_id: Option<String>,
    /// M-Pesa merchant request id.
    pub merchant_request_id: Option<String>,
    /// Caller-issued idempotent gateway reference (SHERIA-{id}-{suffix}).
    pub provider_reference: Option<String>,

    // Populated only after successful verification.
    pub provider_transaction_id: Option<String>,
    pub provider_channel: Option<String>,
    pub provider_paid_at: Option<i64>,

    /// One-way latch: once true the finalizer never runs again.
    pub is_finalized: bool,
    /// Set once by the finalizer, never reassigned.
    pub invoice_id: Option<String>,

    pub failure_reason: Option<String>,

    // Manual-transfer governance.
    pub admin_notes: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,

    // Paying subject (at most one of these is the owner).
    pub account_id: Option<String>,
    pub institution_id: Option<String>,

    // What is being paid for - purpose-dependent subset.
    pub registration_intent_id: Option<String>,
    pub product_id: Option<String>,
    pub document_id: Option<String>,
    pub duration_months: Option<i64>,

    /// Payer contact handed to the provider (MSISDN or email).
    pub payer_contact: String,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to create a new payment intent.
#[derive(Debug, Clone)]
pub struct CreatePaymentIntent {
    pub provider: PaymentProvider,
    pub method: String,
    pub purpose: PaymentPurpose,
    pub status: IntentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub payer_contact: String,
    pub account_id: Option<String>,
    pub institution_id: Option<String>,
    pub registration_intent_id: Option<String>,
    pub product_id: Option<String>,
    pub document_id: Option<String>,
    pub duration_months: Option<i64>,
}
