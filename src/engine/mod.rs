//! The payment lifecycle and reconciliation engine.
//!
//! `ingest` records and deduplicates inbound notifications, `lifecycle`
//! applies verified outcomes to the intent state machine, `finalize`
//! performs the exactly-once domain side effect, `invoice` mints sequential
//! numbers, and `reconcile` is the shared verify-then-finalize sequence used
//! by both the webhook and confirm paths.

pub mod finalize;
pub mod ingest;
pub mod invoice;
pub mod lifecycle;
pub mod reconcile;

pub use finalize::{finalize_if_needed, FinalizeOutcome};
pub use ingest::{dedupe_hash, ingest, Ingested};
pub use invoice::mint_invoice_for_intent;
pub use lifecycle::{apply_verification, VerificationApplied};
pub use reconcile::{confirm_with_outcome, ConfirmResult};
