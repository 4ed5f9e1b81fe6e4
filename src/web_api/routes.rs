//! Router assembly.

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::custody_routes::custody_routes;
use super::health_check;
use super::intercom_routes::intercom_routes;
use super::monitor_routes::monitor_routes;
use super::system_routes::system_routes;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(health_check))
        .nest("/api/custody", custody_routes())
        .nest("/api/interfonia-sip", intercom_routes())
        .nest("/api/system", system_routes())
        .merge(monitor_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
