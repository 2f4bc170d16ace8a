//! Fixed introspection endpoints.
//!
//! These routes belong to the server, not to the mock tree, so a table
//! swap never adds or removes them.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `{prefix}/routes` | Listing of the current snapshot |
//! | `GET` | `{prefix}/health` | Route count and watch loop state |
//! | `POST` | `{prefix}/rebuild` | Rebuild now and report the result |

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::info;

use mr_routes::RouteSummary;

use crate::error::DispatchError;
use crate::state::SharedState;

/// Body of `GET {prefix}/routes`.
#[derive(Debug, Serialize)]
pub struct RouteListing {
    /// Generation of the listed snapshot.
    pub generation: u64,
    /// Number of routes.
    pub count: usize,
    /// The routes in registration order.
    pub routes: Vec<RouteSummary>,
}

/// Body of `GET {prefix}/health`.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Number of routes currently served.
    pub routes: usize,
    /// Watch loop state: `idle`, `pending`, `rebuilding` or `closed`.
    pub watch: &'static str,
}

/// Body of `POST {prefix}/rebuild`.
#[derive(Debug, Serialize)]
pub struct RebuildSummary {
    /// Generation of the installed table.
    pub generation: u64,
    /// Number of routes in the installed table.
    pub routes: usize,
    /// Number of entries left out.
    pub skipped: usize,
    /// How long the rebuild took.
    pub duration_ms: u128,
}

/// Lists the routes of the current snapshot.
pub async fn list_routes(State(state): State<SharedState>) -> Json<RouteListing> {
    let table = state.snapshot();
    Json(RouteListing {
        generation: table.generation(),
        count: table.len(),
        routes: table.describe(),
    })
}

/// Reports liveness.
pub async fn health(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        routes: state.route_count(),
        watch: state.loop_state().as_str(),
    })
}

/// Rebuilds the table through the watch loop.
pub async fn rebuild(
    State(state): State<SharedState>,
) -> Result<Json<RebuildSummary>, DispatchError> {
    let report = state.force_rebuild().await?;
    info!(
        generation = report.generation,
        routes = report.routes,
        "Rebuild requested over HTTP"
    );
    Ok(Json(RebuildSummary {
        generation: report.generation,
        routes: report.routes,
        skipped: report.skipped.len(),
        duration_ms: report.duration.as_millis(),
    }))
}
