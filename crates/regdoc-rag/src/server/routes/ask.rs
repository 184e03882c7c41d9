//! Question answering endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::session::SessionStore;
use crate::types::AskResponse;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Conversation to continue; a new one is started when absent
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskApiResponse {
    #[serde(flatten)]
    pub response: AskResponse,
    pub session_id: String,
}

/// POST /api/ask - Answer a question from the indexed documents
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskApiResponse>> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(Error::InvalidRequest("Question cannot be empty".to_string()));
    }

    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(SessionStore::new_session_id);

    let start = Instant::now();
    tracing::info!("Question (session {}): \"{}\"", session_id, question);

    let response = state
        .generator()
        .ask_in_session(state.sessions(), &session_id, question)
        .await
        .map_err(|e| {
            tracing::error!("Pipeline failure: {}", e);
            Error::Pipeline(e.to_string())
        })?;

    tracing::info!(
        "Answered in {}ms (status {:?}, {} chunks)",
        start.elapsed().as_millis(),
        response.status,
        response.num_chunks
    );

    Ok(Json(AskApiResponse { response, session_id }))
}
