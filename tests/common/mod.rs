//! Test utilities and fixtures for sheriapay integration tests

#![allow(dead_code)]

use rusqlite::Connection;
use tempfile::TempDir;

pub use sheriapay::db::{create_pool, init_db, queries, AppState, DbPool};
pub use sheriapay::models::*;
pub use sheriapay::providers::{MpesaClient, MpesaConfig, PaystackClient, PaystackConfig, VerifyOutcome};

pub const TEST_VAT_BPS: i64 = 1600;
pub const TEST_OPERATOR_TOKEN: &str = "op_test_token";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// File-backed pool for tests that exercise concurrency across connections.
/// The TempDir must outlive the pool.
pub fn setup_file_db() -> (TempDir, DbPool) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("test.db");
    let pool = create_pool(path.to_str().expect("non-utf8 temp path"))
        .expect("Failed to create test pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    (dir, pool)
}

pub fn test_state(pool: DbPool) -> AppState {
    AppState {
        db: pool,
        mpesa: MpesaClient::new(MpesaConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            consumer_key: "test".to_string(),
            consumer_secret: "test".to_string(),
            shortcode: "174379".to_string(),
            passkey: "test".to_string(),
            callback_url: "http://localhost/payments/mpesa/callback".to_string(),
        }),
        paystack: PaystackClient::new(PaystackConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            secret_key: "sk_test_secret".to_string(),
            callback_url: "http://localhost/payments/paystack/return".to_string(),
        }),
        operator_token: TEST_OPERATOR_TOKEN.to_string(),
        vat_rate_bps: TEST_VAT_BPS,
        signup_fee_cents: 50_000,
    }
}

pub fn create_test_account(conn: &Connection, email: &str) -> Account {
    queries::create_account(conn, email, "Test User", None).expect("Failed to create test account")
}

pub fn create_test_product(conn: &Connection, kind: ProductKind, price_cents: i64) -> ContentProduct {
    queries::create_content_product(conn, "Test Product", kind, price_cents, "KES")
        .expect("Failed to create test product")
}

pub fn create_test_document(conn: &Connection, price_cents: i64) -> LegalDocument {
    queries::create_legal_document(conn, "Test Document", price_cents, "KES")
        .expect("Failed to create test document")
}

pub fn create_test_institution(conn: &Connection, seat_limit: i64) -> Institution {
    queries::create_institution(conn, "Test Institution", seat_limit)
        .expect("Failed to create test institution")
}

pub fn create_test_registration(
    conn: &Connection,
    email: &str,
    institution_id: Option<&str>,
) -> RegistrationIntent {
    queries::create_registration_intent(
        conn,
        &CreateRegistrationIntent {
            email: email.to_string(),
            name: "Test Registrant".to_string(),
            institution_id: institution_id.map(str::to_string),
        },
    )
    .expect("Failed to create test registration")
}

/// Baseline intent input; tests adjust fields before inserting.
pub fn intent_input(
    provider: PaymentProvider,
    purpose: PaymentPurpose,
    amount_cents: i64,
) -> CreatePaymentIntent {
    CreatePaymentIntent {
        provider,
        method: "test".to_string(),
        purpose,
        status: match provider {
            PaymentProvider::ManualTransfer => IntentStatus::PendingApproval,
            _ => IntentStatus::Pending,
        },
        amount_cents,
        currency: "KES".to_string(),
        payer_contact: "254700000000".to_string(),
        account_id: None,
        institution_id: None,
        registration_intent_id: None,
        product_id: None,
        document_id: None,
        duration_months: None,
    }
}

pub fn create_intent(conn: &Connection, input: &CreatePaymentIntent) -> PaymentIntent {
    queries::create_payment_intent(conn, input).expect("Failed to create test intent")
}

pub fn success_outcome(amount_cents: i64, currency: &str) -> VerifyOutcome {
    VerifyOutcome {
        successful: true,
        amount_cents,
        currency: currency.to_string(),
        provider_transaction_id: Some("TXN123456".to_string()),
        channel: Some("test".to_string()),
        paid_at: Some(1_700_000_000),
        status: "success".to_string(),
        raw_payload: "{}".to_string(),
    }
}

pub fn failed_outcome(status: &str) -> VerifyOutcome {
    VerifyOutcome {
        successful: false,
        amount_cents: 0,
        currency: String::new(),
        provider_transaction_id: None,
        channel: None,
        paid_at: None,
        status: status.to_string(),
        raw_payload: "{}".to_string(),
    }
}
