use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, SharedState};

/// Build the axum router with all ledger endpoints.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/v1/ledger",
            get(handler::list_entries).post(handler::append_entry),
        )
        .route("/v1/ledger/verify", get(handler::verify_ledger))
        .route("/v1/ledger/summary", get(handler::ledger_summary))
        .route("/v1/ledger/subject/:subject_id", get(handler::entries_by_subject))
        .route("/v1/ledger/:id", get(handler::get_entry))
        .route("/v1/discrepancies", get(handler::list_discrepancies))
        .route("/v1/discrepancies/:id", get(handler::get_discrepancy))
        .route("/v1/notifications", get(handler::list_notifications))
        .route("/v1/notifications/read", post(handler::mark_notifications_read))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
