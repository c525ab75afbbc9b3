//! HTTP surface: initiation, webhooks, confirm/reconciliation, status reads
//! and operator approval of manual transfers.

pub mod manual;
pub mod payments;
pub mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth;
use crate::db::AppState;

pub fn router(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/payments/manual/{id}/approve", post(manual::approve))
        .route("/payments/manual/{id}/reject", post(manual::reject))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::operator_auth,
        ));

    Router::new()
        .route("/payments/{provider}/initiate", post(payments::initiate))
        .route("/payments/{provider}/confirm", post(payments::confirm))
        .route("/payments/intent/{id}", get(payments::get_intent))
        .route("/payments/mpesa/callback", post(webhooks::mpesa_callback))
        .route("/payments/paystack/webhook", post(webhooks::paystack_webhook))
        .merge(operator_routes)
        .with_state(state)
}
