//! API routes for the RAG server

pub mod ask;
pub mod sessions;

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ask", post(ask::ask))
        .route("/sessions/:id", delete(sessions::clear_session))
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<Value> {
    let manifest = state.index().manifest();
    let config = state.config();

    Json(json!({
        "name": "regdoc-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Grounded question answering over UK regulatory documents",
        "index": {
            "records": manifest.record_count,
            "embedding_model": manifest.embedding_model,
            "dimensions": manifest.dimensions,
            "built_at": manifest.built_at,
        },
        "llm": {
            "provider": config.llm.provider,
            "model": config.llm.model,
        },
        "retrieval": {
            "top_k": config.retrieval.top_k,
            "memory_window": config.memory.window,
        },
        "endpoints": {
            "POST /api/ask": "Ask a question ({question, session_id?})",
            "DELETE /api/sessions/:id": "Clear a conversation's memory",
            "GET /api/info": "Service and index information",
            "GET /health": "Liveness check",
            "GET /ready": "Readiness check"
        }
    }))
}
