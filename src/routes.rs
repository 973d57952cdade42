use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::gatekeeper::gatekeeper_middleware;
use crate::handlers::{
    contact_handler, csp_report_handler, health_handler, inquiry_handler, metrics_handler,
    page_handler,
};
use crate::state::AppState;

// Every route, fallback included, sits behind the gatekeeper.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/contact", post(contact_handler))
        .route("/api/inquiry", post(inquiry_handler))
        // JSON reports only; `application/csp-report` bodies get 415 at the gate
        .route("/api/csp-report", post(csp_report_handler))
        .fallback(page_handler)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            gatekeeper_middleware,
        ))
        .with_state(state)
}
