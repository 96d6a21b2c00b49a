use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the storage backend and report status with the live socket count.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.games.require_backend().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let connections = state.hub.connected_total().await;
    if state.games.is_degraded() {
        HealthResponse::degraded(connections)
    } else {
        HealthResponse::ok(connections)
    }
}
