//! Confirm/reconciliation: the shared verify-then-finalize sequence.

mod common;

use common::*;
use sheriapay::engine::confirm_with_outcome;

#[test]
fn confirm_with_success_outcome_finalizes() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "confirm@example.com");
    let product = create_test_product(&conn, ProductKind::OneTime, 250_000);

    let mut input = intent_input(PaymentProvider::Paystack, PaymentPurpose::ProductPurchase, 250_000);
    input.account_id = Some(account.id.clone());
    input.product_id = Some(product.id.clone());
    let intent = create_intent(&conn, &input);

    let result = confirm_with_outcome(
        &mut conn,
        &intent.id,
        Some(&success_outcome(250_000, "KES")),
        TEST_VAT_BPS,
    )
    .expect("confirm failed");

    assert_eq!(result.status, IntentStatus::Success);
    assert!(result.is_finalized);
    assert!(result.invoice_number.is_some());
    assert!(queries::get_product_ownership(&conn, &account.id, &product.id)
        .expect("lookup failed")
        .is_some());
}

#[test]
fn confirm_is_idempotent() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "again@example.com");
    let product = create_test_product(&conn, ProductKind::OneTime, 250_000);

    let mut input = intent_input(PaymentProvider::Paystack, PaymentPurpose::ProductPurchase, 250_000);
    input.account_id = Some(account.id);
    input.product_id = Some(product.id);
    let intent = create_intent(&conn, &input);

    let outcome = success_outcome(250_000, "KES");
    let first = confirm_with_outcome(&mut conn, &intent.id, Some(&outcome), TEST_VAT_BPS)
        .expect("confirm failed");
    // A client polling again (or a late webhook racing the poll) changes
    // nothing and sees the same invoice.
    let second = confirm_with_outcome(&mut conn, &intent.id, Some(&outcome), TEST_VAT_BPS)
        .expect("confirm failed");

    assert_eq!(first.invoice_number, second.invoice_number);
    assert!(second.is_finalized);

    let invoices: i64 = conn
        .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))
        .expect("count failed");
    assert_eq!(invoices, 1);
}

#[test]
fn confirm_without_outcome_leaves_pending() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000),
    );

    let result =
        confirm_with_outcome(&mut conn, &intent.id, None, TEST_VAT_BPS).expect("confirm failed");
    assert_eq!(result.status, IntentStatus::Pending);
    assert!(!result.is_finalized);
    assert!(result.invoice_number.is_none());
}

#[test]
fn confirm_with_failed_outcome_reports_reason() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000),
    );

    let result = confirm_with_outcome(
        &mut conn,
        &intent.id,
        Some(&failed_outcome("DS timeout user cannot be reached")),
        TEST_VAT_BPS,
    )
    .expect("confirm failed");

    assert_eq!(result.status, IntentStatus::Failed);
    assert_eq!(
        result.failure_reason.as_deref(),
        Some("DS timeout user cannot be reached")
    );
    assert!(!result.is_finalized);
}

#[test]
fn late_success_cannot_revive_failed_intent() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Paystack, PaymentPurpose::SignupFee, 50_000),
    );

    confirm_with_outcome(&mut conn, &intent.id, Some(&failed_outcome("declined")), TEST_VAT_BPS)
        .expect("confirm failed");
    let result = confirm_with_outcome(
        &mut conn,
        &intent.id,
        Some(&success_outcome(50_000, "KES")),
        TEST_VAT_BPS,
    )
    .expect("confirm failed");

    assert_eq!(result.status, IntentStatus::Failed);
    assert!(!result.is_finalized);
}

#[test]
fn confirm_heals_success_that_missed_finalization() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "heal@example.com");
    let document = create_test_document(&conn, 50_000);

    let mut input = intent_input(PaymentProvider::Mpesa, PaymentPurpose::DocumentPurchase, 50_000);
    input.account_id = Some(account.id.clone());
    input.document_id = Some(document.id.clone());
    let intent = create_intent(&conn, &input);

    // Verification landed but finalization never ran (e.g. crash between the
    // two). Confirm without a fresh outcome must still finalize.
    sheriapay::engine::apply_verification(&mut conn, &intent.id, &success_outcome(50_000, "KES"))
        .expect("verification failed");

    let result =
        confirm_with_outcome(&mut conn, &intent.id, None, TEST_VAT_BPS).expect("confirm failed");
    assert!(result.is_finalized);
    assert!(queries::get_document_grant(&conn, &account.id, &document.id)
        .expect("lookup failed")
        .is_some());
}

#[test]
fn manual_intent_confirm_reports_pending_approval() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::ManualTransfer, PaymentPurpose::SignupFee, 50_000),
    );

    let result =
        confirm_with_outcome(&mut conn, &intent.id, None, TEST_VAT_BPS).expect("confirm failed");
    assert_eq!(result.status, IntentStatus::PendingApproval);
    assert!(!result.is_finalized);
}
