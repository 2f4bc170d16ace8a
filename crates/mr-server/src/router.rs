//! Axum router construction.
//!
//! Assembles the fixed introspection routes and the fallback that serves
//! the mock route table into a single [`Router`], with permissive CORS
//! and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatch::dispatch;
use crate::handlers;
use crate::state::AppState;

/// Builds the complete router.
///
/// - `GET {prefix}/routes`, `GET {prefix}/health`, `POST {prefix}/rebuild`
/// - everything else is matched against the current route table
///
/// CORS allows any origin, method and header.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let prefix = state.prefix().to_owned();

    Router::new()
        .route(&format!("{prefix}/routes"), get(handlers::list_routes))
        .route(&format!("{prefix}/health"), get(handlers::health))
        .route(&format!("{prefix}/rebuild"), post(handlers::rebuild))
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
