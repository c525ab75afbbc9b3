//! Exactly-once finalization and the five purpose dispatch branches.

mod common;

use std::str::FromStr;

use common::*;
use sheriapay::engine::{apply_verification, finalize_if_needed, FinalizeOutcome};

fn succeed(conn: &mut rusqlite::Connection, intent_id: &str, amount_cents: i64) {
    apply_verification(conn, intent_id, &success_outcome(amount_cents, "KES"))
        .expect("verification failed");
}

#[test]
fn signup_finalization_creates_account_and_completes_registration() {
    let mut conn = setup_test_db();
    let registration = create_test_registration(&conn, "new@example.com", None);

    let mut input = intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000);
    input.registration_intent_id = Some(registration.id.clone());
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 50_000);

    let outcome = finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");
    assert!(matches!(outcome, FinalizeOutcome::Finalized { .. }));

    let account = queries::get_account_by_registration(&conn, &registration.id)
        .expect("lookup failed")
        .expect("account not created");
    assert_eq!(account.email, "new@example.com");

    let reg = queries::get_registration_intent_by_id(&conn, &registration.id)
        .expect("lookup failed")
        .expect("registration missing");
    assert!(reg.completed);

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert!(fresh.is_finalized);
    assert_eq!(fresh.account_id.as_deref(), Some(account.id.as_str()));
    assert!(fresh.invoice_id.is_some());

    // The invoice is owned by the freshly created account.
    let invoice = queries::get_invoice_by_intent(&conn, &intent.id)
        .expect("lookup failed")
        .expect("invoice missing");
    assert_eq!(invoice.account_id.as_deref(), Some(account.id.as_str()));
}

#[test]
fn signup_finalization_reserves_institution_seat() {
    let mut conn = setup_test_db();
    let institution = create_test_institution(&conn, 5);
    let registration = create_test_registration(&conn, "member@example.com", Some(&institution.id));

    let mut input = intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000);
    input.registration_intent_id = Some(registration.id.clone());
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 50_000);
    finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");

    let fresh = queries::get_institution_by_id(&conn, &institution.id)
        .expect("lookup failed")
        .expect("institution missing");
    assert_eq!(fresh.seats_reserved, 1);
}

#[test]
fn seat_shortfall_is_noted_but_registration_completes() {
    let mut conn = setup_test_db();
    let institution = create_test_institution(&conn, 1);
    // Exhaust the single seat.
    assert!(queries::reserve_institution_seat(&conn, &institution.id).expect("reserve failed"));

    let registration = create_test_registration(&conn, "late@example.com", Some(&institution.id));
    let mut input = intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000);
    input.registration_intent_id = Some(registration.id.clone());
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 50_000);

    let outcome = finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");
    assert!(matches!(outcome, FinalizeOutcome::Finalized { .. }));

    // Paid intent is never stranded: the account exists, the shortfall is an
    // operator problem.
    assert!(queries::get_account_by_registration(&conn, &registration.id)
        .expect("lookup failed")
        .is_some());
    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert!(fresh.admin_notes.expect("note expected").contains("seat capacity"));
}

#[test]
fn product_purchase_grants_ownership_once() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "buyer@example.com");
    let product = create_test_product(&conn, ProductKind::OneTime, 250_000);

    let mut input = intent_input(PaymentProvider::Paystack, PaymentPurpose::ProductPurchase, 250_000);
    input.account_id = Some(account.id.clone());
    input.product_id = Some(product.id.clone());
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 250_000);

    let first = finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");
    assert!(matches!(first, FinalizeOutcome::Finalized { .. }));
    let second = finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");
    assert_eq!(second, FinalizeOutcome::AlreadyFinalized);

    let ownership = queries::get_product_ownership(&conn, &account.id, &product.id)
        .expect("lookup failed")
        .expect("ownership missing");
    assert_eq!(ownership.source_intent_id, intent.id);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM product_ownerships", [], |row| row.get(0))
        .expect("count failed");
    assert_eq!(count, 1);
}

#[test]
fn subscription_extends_window() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "sub@example.com");
    let product = create_test_product(&conn, ProductKind::Subscription, 150_000);

    let mut input =
        intent_input(PaymentProvider::Mpesa, PaymentPurpose::ProductSubscription, 450_000);
    input.account_id = Some(account.id.clone());
    input.product_id = Some(product.id.clone());
    input.duration_months = Some(3);
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 450_000);
    finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");

    let sub = queries::get_subscription_by_account(&conn, &account.id)
        .expect("lookup failed")
        .expect("subscription missing");
    let now = chrono::Utc::now().timestamp();
    assert!(sub.expires_at > now, "window must extend into the future");
    // Roughly three calendar months out.
    assert!(sub.expires_at > now + 80 * 86_400);
    assert!(sub.expires_at < now + 100 * 86_400);
}

#[test]
fn renewal_extends_from_current_expiry() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "renew@example.com");
    let product = create_test_product(&conn, ProductKind::Subscription, 150_000);

    for _ in 0..2 {
        let mut input =
            intent_input(PaymentProvider::Mpesa, PaymentPurpose::ProductSubscription, 150_000);
        input.account_id = Some(account.id.clone());
        input.product_id = Some(product.id.clone());
        input.duration_months = Some(1);
        let intent = create_intent(&conn, &input);
        succeed(&mut conn, &intent.id, 150_000);
        finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");
    }

    let sub = queries::get_subscription_by_account(&conn, &account.id)
        .expect("lookup failed")
        .expect("subscription missing");
    let now = chrono::Utc::now().timestamp();
    // Two one-month renewals stack to roughly two months.
    assert!(sub.expires_at > now + 55 * 86_400);
}

#[test]
fn institution_subscription_extends_institution_window() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "admin@example.com");
    let institution = create_test_institution(&conn, 0);

    let mut input = intent_input(
        PaymentProvider::ManualTransfer,
        PaymentPurpose::InstitutionSubscription,
        1_200_000,
    );
    input.account_id = Some(account.id);
    input.institution_id = Some(institution.id.clone());
    input.duration_months = Some(12);
    let intent = create_intent(&conn, &input);

    queries::approve_manual_intent(&conn, &intent.id, "ops@sheria.local").expect("approve failed");
    finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");

    let sub = queries::get_institution_subscription(&conn, &institution.id)
        .expect("lookup failed")
        .expect("institution subscription missing");
    assert!(sub.expires_at > chrono::Utc::now().timestamp() + 300 * 86_400);
}

#[test]
fn document_purchase_grants_access() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "reader@example.com");
    let document = create_test_document(&conn, 50_000);

    let mut input = intent_input(PaymentProvider::Mpesa, PaymentPurpose::DocumentPurchase, 50_000);
    input.account_id = Some(account.id.clone());
    input.document_id = Some(document.id.clone());
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 50_000);
    finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");

    assert!(queries::get_document_grant(&conn, &account.id, &document.id)
        .expect("lookup failed")
        .is_some());
}

#[test]
fn finalize_requires_success() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000),
    );

    let outcome = finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).expect("finalize failed");
    assert_eq!(
        outcome,
        FinalizeOutcome::NotSuccessful {
            status: IntentStatus::Pending
        }
    );

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert!(!fresh.is_finalized);
    assert!(fresh.invoice_id.is_none());
}

#[test]
fn failed_side_effect_rolls_back_the_latch() {
    let mut conn = setup_test_db();
    // Signup intent with no registration attached: the dispatch errors
    // after the latch flip, so the whole attempt must unwind.
    let input = intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000);
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 50_000);

    assert!(finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS).is_err());

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert!(!fresh.is_finalized, "latch must roll back with the side effect");
    assert!(fresh.invoice_id.is_none());
    assert!(fresh
        .admin_notes
        .expect("note expected")
        .contains("Finalization failed"));

    // No invoice number was burned.
    let seq: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(last_number), 0) FROM invoice_sequences",
            [],
            |row| row.get(0),
        )
        .expect("count failed");
    assert_eq!(seq, 0);
}

#[test]
fn concurrent_finalization_is_exactly_once() {
    let (_dir, pool) = setup_file_db();

    let intent_id = {
        let conn = pool.get().expect("no connection");
        let account = create_test_account(&conn, "race@example.com");
        let product = create_test_product(&conn, ProductKind::OneTime, 250_000);
        let mut input =
            intent_input(PaymentProvider::Paystack, PaymentPurpose::ProductPurchase, 250_000);
        input.account_id = Some(account.id);
        input.product_id = Some(product.id);
        let intent = create_intent(&conn, &input);

        let mut conn = pool.get().expect("no connection");
        apply_verification(&mut conn, &intent.id, &success_outcome(250_000, "KES"))
            .expect("verification failed");
        intent.id
    };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let intent_id = intent_id.clone();
        handles.push(std::thread::spawn(move || {
            let mut conn = pool.get().expect("no connection");
            finalize_if_needed(&mut conn, &intent_id, TEST_VAT_BPS).expect("finalize failed")
        }));
    }

    let outcomes: Vec<FinalizeOutcome> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, FinalizeOutcome::Finalized { .. }))
        .count();
    assert_eq!(winners, 1, "exactly one caller may win the latch");

    let conn = pool.get().expect("no connection");
    let ownerships: i64 = conn
        .query_row("SELECT COUNT(*) FROM product_ownerships", [], |row| row.get(0))
        .expect("count failed");
    assert_eq!(ownerships, 1);
    let invoices: i64 = conn
        .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))
        .expect("count failed");
    assert_eq!(invoices, 1);
}

#[test]
fn invoice_splits_vat_tax_inclusively() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "vat@example.com");
    let product = create_test_product(&conn, ProductKind::OneTime, 116_000);

    let mut input = intent_input(PaymentProvider::Paystack, PaymentPurpose::ProductPurchase, 116_000);
    input.account_id = Some(account.id);
    input.product_id = Some(product.id);
    let intent = create_intent(&conn, &input);
    succeed(&mut conn, &intent.id, 116_000);

    let invoice_number = match finalize_if_needed(&mut conn, &intent.id, TEST_VAT_BPS)
        .expect("finalize failed")
    {
        FinalizeOutcome::Finalized { invoice_number } => invoice_number,
        other => panic!("expected Finalized, got {:?}", other),
    };

    let invoice = queries::get_invoice_by_intent(&conn, &intent.id)
        .expect("lookup failed")
        .expect("invoice missing");
    assert_eq!(invoice.number, invoice_number);
    assert_eq!(invoice.gross_cents, 116_000);
    assert_eq!(invoice.net_cents, 100_000);
    assert_eq!(invoice.tax_cents, 16_000);
    assert_eq!(invoice.net_cents + invoice.tax_cents, invoice.gross_cents);

    let year = chrono::Utc::now().format("%Y").to_string();
    assert!(invoice.number.starts_with(&format!("INV-{}-", year)));

    let lines = queries::list_invoice_lines(&conn, &invoice.id).expect("lines failed");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].gross_cents, 116_000);
}

#[test]
fn purpose_strings_round_trip() {
    for purpose in [
        PaymentPurpose::SignupFee,
        PaymentPurpose::ProductPurchase,
        PaymentPurpose::ProductSubscription,
        PaymentPurpose::InstitutionSubscription,
        PaymentPurpose::DocumentPurchase,
    ] {
        assert_eq!(PaymentPurpose::from_str(purpose.as_str()), Ok(purpose));
    }
}
