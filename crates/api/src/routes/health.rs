//! Liveness endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use projections::ReadModel;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Entries held by each read model, as of the last catch-up.
    pub read_models: BTreeMap<&'static str, usize>,
}

/// GET /health
pub async fn check<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let models: [&dyn ReadModel; 3] = [&state.orders_view, &state.stats_view, &state.inventory_view];
    Json(HealthResponse {
        status: "ok",
        read_models: models.iter().map(|m| (m.name(), m.count())).collect(),
    })
}
