//! Session management endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::server::state::AppState;

/// DELETE /api/sessions/:id - Forget a conversation and its memory
pub async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    if !state.sessions().remove(&id) {
        return Err(Error::not_found(
            format!("Session '{}'", id),
            "Sessions are created by POST /api/ask.",
        ));
    }

    tracing::info!("Cleared session {}", id);
    Ok(Json(json!({ "session_id": id, "cleared": true })))
}
