//! API route configuration

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState};

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let nmetric = Router::new()
        .route("/subscriber/:imsi", get(handlers::get_subscriber))
        .route("/subscribers", get(handlers::list_subscribers))
        .route("/nfstatus", get(handlers::nf_status_all))
        .route("/nfstatus/:nf_type", get(handlers::nf_status_by_type))
        .route("/nfservicestats/:family", get(handlers::service_stats))
        .route("/test/rogueips", post(handlers::push_test_rogue_ips));

    Router::new()
        .nest("/nmetric", nmetric)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_text))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
