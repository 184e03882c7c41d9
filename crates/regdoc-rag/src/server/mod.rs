//! HTTP server for the RAG system

pub mod routes;
pub mod state;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use state::AppState;

/// RAG HTTP Server
pub struct RagServer {
    config: RagConfig,
    state: AppState,
}

impl RagServer {
    /// Create a server; fails if the index has not been built
    pub async fn new(config: RagConfig) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Create from prepared state
    pub fn with_state(config: RagConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            .nest("/api", routes::api_routes())
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting RAG server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Readiness check endpoint: an empty index or unreachable LLM is not ready
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let readiness = state.readiness().await;
    let (status, label) = if readiness.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status,
        Json(json!({
            "status": label,
            "records": readiness.records,
            "llm_reachable": readiness.llm_reachable,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::embedding::MockEmbeddingProvider;
    use crate::providers::llm::MockLlmProvider;
    use crate::retrieval::{BuildOptions, VectorIndex};
    use crate::types::{Chunk, ChunkMetadata};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn embedder() -> MockEmbeddingProvider {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
        mock.expect_dimensions().return_const(2usize);
        mock.expect_model().return_const("fixed".to_string());
        mock
    }

    async fn server(dir: &TempDir, llm: MockLlmProvider) -> RagServer {
        server_with(dir, llm, RagConfig::default()).await
    }

    async fn server_with(dir: &TempDir, llm: MockLlmProvider, config: RagConfig) -> RagServer {
        let chunk = Chunk {
            text: "Statutory sick pay is payable from the first day of absence.".into(),
            metadata: ChunkMetadata { source: "employment-rights.pdf".into(), page: Some(4) },
            char_start: 0,
            char_end: 61,
        };
        let index = VectorIndex::build(
            &dir.path().join("vector_index"),
            &[chunk],
            &embedder(),
            &BuildOptions::default(),
        )
        .await
        .unwrap();

        let state = AppState::from_parts(config.clone(), Arc::new(index), Arc::new(embedder()), Arc::new(llm));
        RagServer::with_state(config, state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_ask(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ask")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let router = server(&dir, MockLlmProvider::new()).await.build_router();

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn test_ask_returns_answer_and_sources() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .returning(|_| Ok("From the first day of absence.".to_string()));
        let router = server(&dir, llm).await.build_router();

        let response = router
            .oneshot(post_ask(json!({ "question": "When does sick pay start?", "session_id": "s1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["answer"], "From the first day of absence.");
        assert_eq!(body["status"], "answered");
        assert_eq!(body["num_chunks"], 1);
        assert_eq!(body["sources"][0]["page"], "4");
        assert_eq!(body["session_id"], "s1");
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_complete().never();
        let router = server(&dir, llm).await.build_router();

        let response = router.oneshot(post_ask(json!({ "question": "   " }))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["type"], "invalid_request");
    }

    #[tokio::test]
    async fn test_clear_session() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_complete().returning(|_| Ok("ok".to_string()));
        let server = server(&dir, llm).await;
        let router = server.build_router();

        router
            .clone()
            .oneshot(post_ask(json!({ "question": "hello", "session_id": "s1" })))
            .await
            .unwrap();

        let clear = |id: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/sessions/{}", id))
                .body(Body::empty())
                .unwrap()
        };

        let response = router.clone().oneshot(clear("s1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!server.state.sessions().contains("s1"));
        assert!(server.state.sessions().is_empty());

        let response = router.oneshot(clear("unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_anonymous_sessions_stay_bounded() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_complete().returning(|_| Ok("ok".to_string()));
        let mut config = RagConfig::default();
        config.memory.max_sessions = 20;
        let server = server_with(&dir, llm, config).await;
        let router = server.build_router();

        for _ in 0..60 {
            let response = router
                .clone()
                .oneshot(post_ask(json!({ "question": "hello" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        router
            .clone()
            .oneshot(post_ask(json!({ "question": "hello", "session_id": "named" })))
            .await
            .unwrap();
        assert_eq!(server.state.sessions().len(), 20);
        assert!(server.state.sessions().contains("named"));

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/sessions/named")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.state.sessions().len(), 19);
    }

    #[tokio::test]
    async fn test_ready_requires_reachable_llm() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_health_check().return_const(true);
        let router = server(&dir, llm).await.build_router();

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["records"], 1);

        let mut llm = MockLlmProvider::new();
        llm.expect_health_check().return_const(false);
        let other = TempDir::new().unwrap();
        let router = server(&other, llm).await.build_router();

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["llm_reachable"], false);
    }
}
