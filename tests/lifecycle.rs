//! Intent state machine: verified transitions, amount/currency integrity,
//! terminal immutability and the manual approval flow.

mod common;

use common::*;
use sheriapay::engine::{apply_verification, VerificationApplied};

#[test]
fn success_outcome_moves_pending_to_success() {
    let mut conn = setup_test_db();
    let account = create_test_account(&conn, "buyer@example.com");
    let product = create_test_product(&conn, ProductKind::OneTime, 250_000);

    let mut input = intent_input(PaymentProvider::Paystack, PaymentPurpose::ProductPurchase, 250_000);
    input.account_id = Some(account.id);
    input.product_id = Some(product.id);
    let intent = create_intent(&conn, &input);

    let applied = apply_verification(&mut conn, &intent.id, &success_outcome(250_000, "KES"))
        .expect("apply failed");
    assert_eq!(applied, VerificationApplied::Succeeded);

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert_eq!(fresh.status, IntentStatus::Success);
    assert_eq!(fresh.provider_transaction_id.as_deref(), Some("TXN123456"));
    assert_eq!(fresh.provider_channel.as_deref(), Some("test"));
    assert_eq!(fresh.provider_paid_at, Some(1_700_000_000));
    assert!(!fresh.is_finalized, "verification alone must not finalize");

    // Provider-side truth mirrored exactly once.
    let txn = queries::get_provider_transaction(&conn, PaymentProvider::Paystack, "TXN123456")
        .expect("lookup failed")
        .expect("mirror missing");
    assert_eq!(txn.amount_cents, 250_000);
}

#[test]
fn failed_outcome_moves_pending_to_failed() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000),
    );

    let applied = apply_verification(
        &mut conn,
        &intent.id,
        &failed_outcome("Request cancelled by user"),
    )
    .expect("apply failed");
    assert_eq!(
        applied,
        VerificationApplied::Failed {
            reason: "Request cancelled by user".to_string()
        }
    );

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert_eq!(fresh.status, IntentStatus::Failed);
    assert_eq!(fresh.failure_reason.as_deref(), Some("Request cancelled by user"));
}

#[test]
fn amount_mismatch_forces_failed() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Paystack, PaymentPurpose::SignupFee, 50_000),
    );

    let applied = apply_verification(&mut conn, &intent.id, &success_outcome(49_999, "KES"))
        .expect("apply failed");
    assert_eq!(
        applied,
        VerificationApplied::Failed {
            reason: "amount_mismatch".to_string()
        }
    );

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert_eq!(fresh.status, IntentStatus::Failed);
    assert_eq!(fresh.failure_reason.as_deref(), Some("amount_mismatch"));
    assert!(fresh.admin_notes.expect("note expected").contains("49999"));
}

#[test]
fn currency_mismatch_forces_failed() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Paystack, PaymentPurpose::SignupFee, 50_000),
    );

    let applied = apply_verification(&mut conn, &intent.id, &success_outcome(50_000, "NGN"))
        .expect("apply failed");
    assert_eq!(
        applied,
        VerificationApplied::Failed {
            reason: "currency_mismatch".to_string()
        }
    );
}

#[test]
fn currency_comparison_is_case_insensitive() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Paystack, PaymentPurpose::SignupFee, 50_000),
    );

    let applied = apply_verification(&mut conn, &intent.id, &success_outcome(50_000, "kes"))
        .expect("apply failed");
    assert_eq!(applied, VerificationApplied::Succeeded);
}

#[test]
fn terminal_failed_intent_never_moves() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000),
    );

    apply_verification(&mut conn, &intent.id, &failed_outcome("timeout")).expect("apply failed");

    // A late success delivery for an already-failed intent is ignored.
    let applied = apply_verification(&mut conn, &intent.id, &success_outcome(50_000, "KES"))
        .expect("apply failed");
    assert_eq!(
        applied,
        VerificationApplied::Untouched {
            status: IntentStatus::Failed
        }
    );

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert_eq!(fresh.status, IntentStatus::Failed);
    assert_eq!(fresh.failure_reason.as_deref(), Some("timeout"));
}

#[test]
fn redundant_success_delivery_reports_succeeded() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Paystack, PaymentPurpose::SignupFee, 50_000),
    );

    let outcome = success_outcome(50_000, "KES");
    apply_verification(&mut conn, &intent.id, &outcome).expect("apply failed");
    // Second delivery: still Succeeded so the caller can heal a missed
    // finalization, but nothing is rewritten.
    let applied = apply_verification(&mut conn, &intent.id, &outcome).expect("apply failed");
    assert_eq!(applied, VerificationApplied::Succeeded);
}

#[test]
fn verification_cannot_touch_pending_approval() {
    let mut conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(
            PaymentProvider::ManualTransfer,
            PaymentPurpose::InstitutionSubscription,
            1_000_000,
        ),
    );

    let applied = apply_verification(&mut conn, &intent.id, &success_outcome(1_000_000, "KES"))
        .expect("apply failed");
    assert_eq!(
        applied,
        VerificationApplied::Untouched {
            status: IntentStatus::PendingApproval
        }
    );
}

#[test]
fn operator_approval_moves_pending_approval_to_success() {
    let conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::ManualTransfer, PaymentPurpose::SignupFee, 50_000),
    );

    assert!(queries::approve_manual_intent(&conn, &intent.id, "ops@sheria.local")
        .expect("approve failed"));

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert_eq!(fresh.status, IntentStatus::Success);
    assert_eq!(fresh.approved_by.as_deref(), Some("ops@sheria.local"));
    assert!(fresh.approved_at.is_some());

    // Approval is not repeatable.
    assert!(!queries::approve_manual_intent(&conn, &intent.id, "ops@sheria.local")
        .expect("approve failed"));
}

#[test]
fn operator_rejection_moves_pending_approval_to_cancelled() {
    let conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::ManualTransfer, PaymentPurpose::SignupFee, 50_000),
    );

    assert!(queries::reject_manual_intent(&conn, &intent.id, "ops@sheria.local")
        .expect("reject failed"));

    let fresh = queries::get_intent_by_id(&conn, &intent.id)
        .expect("lookup failed")
        .expect("intent missing");
    assert_eq!(fresh.status, IntentStatus::Cancelled);

    // A rejected transfer cannot later be approved.
    assert!(!queries::approve_manual_intent(&conn, &intent.id, "ops@sheria.local")
        .expect("approve failed"));
}

#[test]
fn approval_guard_rejects_non_manual_intents() {
    let conn = setup_test_db();
    let intent = create_intent(
        &conn,
        &intent_input(PaymentProvider::Mpesa, PaymentPurpose::SignupFee, 50_000),
    );

    assert!(!queries::approve_manual_intent(&conn, &intent.id, "ops@sheria.local")
        .expect("approve failed"));
}
