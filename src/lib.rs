//! Sheriapay - payment lifecycle and reconciliation engine for the Sheria
//! legal-document library.
//!
//! This library records attempted payments before any provider response
//! exists, ingests asynchronous/retried/out-of-order provider notifications,
//! independently re-verifies them against provider truth, and performs
//! exactly-once domain fulfillment with sequential invoice numbering.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod tax;
