use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// Liveness plus a cheap view of registry occupancy.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "rooms": state.registry.room_count(),
        "connections": state.registry.connection_count(),
    }))
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("GIT_SHA"),
    }))
}
