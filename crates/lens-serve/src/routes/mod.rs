pub mod analyze;
pub mod error;
pub mod tasks;

use crate::middleware::correlation::correlation_middleware;
use crate::{AppState, openapi};
use axum::Router;
use axum::middleware;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(analyze::router(state.clone()))
        .merge(tasks::router(state))
        .merge(openapi::router())
        .route_layer(middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
}
