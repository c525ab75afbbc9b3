//! Webhook event store: record-first ingestion and deduplication.

mod common;

use common::*;
use sheriapay::engine::{dedupe_hash, ingest, Ingested};

#[test]
fn first_delivery_is_accepted() {
    let conn = setup_test_db();

    let result = ingest(&conn, PaymentProvider::Paystack, r#"{"event":"charge.success"}"#, Some(true))
        .expect("ingest failed");

    let event_id = match result {
        Ingested::Accepted { event_id } => event_id,
        other => panic!("expected Accepted, got {:?}", other),
    };

    let event = queries::get_webhook_event_by_id(&conn, &event_id)
        .expect("lookup failed")
        .expect("event missing");
    assert_eq!(event.processing_status, ProcessingStatus::Received);
    assert_eq!(event.signature_valid, Some(true));
    assert_eq!(event.raw_body, r#"{"event":"charge.success"}"#);
}

#[test]
fn repeated_delivery_records_once() {
    let conn = setup_test_db();
    let body = r#"{"event":"charge.success","data":{"reference":"SHERIA-1"}}"#;

    assert!(matches!(
        ingest(&conn, PaymentProvider::Paystack, body, Some(true)).expect("ingest failed"),
        Ingested::Accepted { .. }
    ));
    for _ in 0..4 {
        assert!(matches!(
            ingest(&conn, PaymentProvider::Paystack, body, Some(true)).expect("ingest failed"),
            Ingested::Duplicate
        ));
    }

    let events = queries::list_webhook_events(&conn, PaymentProvider::Paystack).expect("list failed");
    assert_eq!(events.len(), 1);
}

#[test]
fn different_bodies_record_separately() {
    let conn = setup_test_db();

    ingest(&conn, PaymentProvider::Mpesa, r#"{"a":1}"#, None).expect("ingest failed");
    ingest(&conn, PaymentProvider::Mpesa, r#"{"a":2}"#, None).expect("ingest failed");

    let events = queries::list_webhook_events(&conn, PaymentProvider::Mpesa).expect("list failed");
    assert_eq!(events.len(), 2);
}

#[test]
fn same_body_from_different_providers_records_separately() {
    let conn = setup_test_db();
    let body = r#"{"shared":"payload"}"#;

    assert!(matches!(
        ingest(&conn, PaymentProvider::Mpesa, body, None).expect("ingest failed"),
        Ingested::Accepted { .. }
    ));
    assert!(matches!(
        ingest(&conn, PaymentProvider::Paystack, body, Some(true)).expect("ingest failed"),
        Ingested::Accepted { .. }
    ));
}

#[test]
fn invalid_signature_is_recorded_and_ignored() {
    let conn = setup_test_db();

    let result = ingest(&conn, PaymentProvider::Paystack, r#"{"event":"evil"}"#, Some(false))
        .expect("ingest failed");

    let event_id = match result {
        Ingested::SignatureRejected { event_id } => event_id,
        other => panic!("expected SignatureRejected, got {:?}", other),
    };

    let event = queries::get_webhook_event_by_id(&conn, &event_id)
        .expect("lookup failed")
        .expect("event missing");
    assert_eq!(event.processing_status, ProcessingStatus::Ignored);
    assert_eq!(event.processing_error.as_deref(), Some("invalid signature"));
}

#[test]
fn replayed_invalid_signature_is_still_a_duplicate() {
    let conn = setup_test_db();
    let body = r#"{"event":"evil"}"#;

    ingest(&conn, PaymentProvider::Paystack, body, Some(false)).expect("ingest failed");
    // A replay of the same bytes collapses onto the original row even when
    // the attacker fixes nothing.
    assert!(matches!(
        ingest(&conn, PaymentProvider::Paystack, body, Some(false)).expect("ingest failed"),
        Ingested::Duplicate
    ));
}

#[test]
fn unsigned_provider_stores_null_signature() {
    let conn = setup_test_db();

    let result =
        ingest(&conn, PaymentProvider::Mpesa, r#"{"Body":{}}"#, None).expect("ingest failed");
    let event_id = match result {
        Ingested::Accepted { event_id } => event_id,
        other => panic!("expected Accepted, got {:?}", other),
    };

    let event = queries::get_webhook_event_by_id(&conn, &event_id)
        .expect("lookup failed")
        .expect("event missing");
    assert_eq!(event.signature_valid, None);
}

#[test]
fn dedupe_hash_scopes_by_provider() {
    let body = b"identical bytes";
    let a = dedupe_hash(PaymentProvider::Mpesa, body);
    let b = dedupe_hash(PaymentProvider::Paystack, body);
    assert_ne!(a, b);
    // Deterministic per provider.
    assert_eq!(a, dedupe_hash(PaymentProvider::Mpesa, body));
    assert_eq!(a.len(), 64);
}
