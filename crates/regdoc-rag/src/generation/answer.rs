//! Grounded answer generation with conversation memory

use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::{with_timeout, CompletionRequest, LlmProvider};
use crate::retrieval::Retriever;
use crate::session::{ConversationMemory, SessionStore};
use crate::types::AskResponse;

use super::prompt::PromptBuilder;

/// Sampling and memory settings for generation
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
    /// Prior turns replayed to the model
    pub window: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.1,
            top_p: 0.9,
            timeout: Duration::from_secs(60),
            window: 5,
        }
    }
}

impl GenerationSettings {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            top_p: config.llm.top_p,
            timeout: config.llm.timeout(),
            window: config.memory.window,
        }
    }
}

/// Answers questions from retrieved context only
pub struct AnswerGenerator {
    retriever: Arc<Retriever>,
    llm: Arc<dyn LlmProvider>,
    settings: GenerationSettings,
}

impl AnswerGenerator {
    pub fn new(retriever: Arc<Retriever>, llm: Arc<dyn LlmProvider>, settings: GenerationSettings) -> Self {
        Self { retriever, llm, settings }
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Answer `question`, recording the exchange in `memory` on success.
    ///
    /// Provider failures come back as a normal response carrying a user-facing
    /// message; only unexpected failures such as a broken index are errors.
    pub async fn ask(&self, question: &str, memory: &mut ConversationMemory) -> Result<AskResponse> {
        let chunks = match self.retriever.retrieve(question).await {
            Ok(chunks) => chunks,
            Err(Error::Provider(e)) => {
                tracing::warn!("Query embedding failed: {}", e);
                return Ok(AskResponse::from_provider_error(&e));
            }
            Err(e) => return Err(e),
        };

        if chunks.is_empty() {
            tracing::info!("No chunks retrieved, skipping generation");
            return Ok(AskResponse::no_documents());
        }

        let context = PromptBuilder::build_context(&chunks);
        let history = memory.recent(self.settings.window);
        let request = CompletionRequest {
            messages: PromptBuilder::build_messages(&context, &history, question),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
        };

        tracing::debug!(
            "Generating with {} chunks and {} prior turns",
            chunks.len(),
            history.len()
        );

        match with_timeout("generation", self.settings.timeout, self.llm.complete(&request)).await {
            Ok(raw) => {
                let answer = raw.trim().to_string();
                memory.append(question, answer.clone());
                Ok(AskResponse::answered(answer, &chunks))
            }
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                Ok(AskResponse::from_provider_error(&e))
            }
        }
    }

    /// Answer within a session, serialized against other requests of that session
    pub async fn ask_in_session(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        question: &str,
    ) -> Result<AskResponse> {
        let handle = sessions.get_or_create(session_id);
        let mut memory = handle.lock().await;
        self.ask(question, &mut memory).await
    }
}
