//! Prompt templates and context assembly for grounded answers

use crate::providers::ChatMessage;
use crate::session::Turn;
use crate::types::{Chunk, FALLBACK_ANSWER};

/// Separator between context blocks
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Anti-hallucination instructions, sent as the system message
pub fn system_prompt() -> String {
    format!(
        r#"You are a UK legal and regulatory assistant. Your job is to answer questions accurately using ONLY the provided context from official UK documents.

STRICT RULES:
1. ONLY use information from the CONTEXT below to answer.
2. If the answer is NOT in the context, reply exactly: "{fallback}"
3. Do NOT make up laws, regulations, dates, or numbers.
4. Quote the relevant section when possible.
5. Keep answers concise and professional.
6. If the context is partially relevant, say what you CAN confirm and what you CANNOT."#,
        fallback = FALLBACK_ANSWER
    )
}

/// Prompt builder for grounded questions
pub struct PromptBuilder;

impl PromptBuilder {
    /// Render retrieved chunks as labelled blocks, in retrieval order
    pub fn build_context(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                format!(
                    "[Source {}: {}, Page {}]\n{}",
                    i + 1,
                    chunk.metadata.source_label(),
                    chunk.metadata.page_label(),
                    chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    /// System message with the context appended after the rules
    pub fn build_system_message(context: &str) -> ChatMessage {
        ChatMessage::system(format!("{}\n\nCONTEXT:\n{}", system_prompt(), context))
    }

    /// Full message list: system, prior turns oldest first, then the question
    pub fn build_messages(context: &str, history: &[Turn], question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(Self::build_system_message(context));

        for turn in history {
            messages.push(ChatMessage::user(turn.question.clone()));
            messages.push(ChatMessage::assistant(turn.answer.clone()));
        }

        messages.push(ChatMessage::user(question));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;
    use crate::types::ChunkMetadata;

    fn chunk(source: &str, page: Option<u32>, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata { source: source.to_string(), page },
            char_start: 0,
            char_end: text.len(),
        }
    }

    #[test]
    fn test_context_labels_and_separators() {
        let chunks = vec![
            chunk("employment-rights.pdf", Some(3), "Sick pay from day one."),
            chunk("", None, "Unlabelled passage."),
        ];

        let context = PromptBuilder::build_context(&chunks);
        assert_eq!(
            context,
            "[Source 1: employment-rights.pdf, Page 3]\nSick pay from day one.\n\n---\n\n[Source 2: Unknown, Page ?]\nUnlabelled passage."
        );
    }

    #[test]
    fn test_empty_context() {
        assert_eq!(PromptBuilder::build_context(&[]), "");
    }

    #[test]
    fn test_system_prompt_carries_fallback_sentence() {
        let prompt = system_prompt();
        assert!(prompt.contains(FALLBACK_ANSWER));
        assert!(prompt.contains("STRICT RULES"));
        assert!(prompt.contains("6. If the context is partially relevant"));
    }

    #[test]
    fn test_messages_in_order() {
        let history = vec![
            Turn::new("What is SSP?", "Statutory sick pay."),
            Turn::new("From when?", "Day one."),
        ];

        let messages = PromptBuilder::build_messages("CTX", &history, "How much?");
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert!(messages[0].content.ends_with("\n\nCONTEXT:\nCTX"));
        assert_eq!(messages[1].content, "What is SSP?");
        assert_eq!(messages[4].content, "Day one.");
        assert_eq!(messages[5].content, "How much?");
    }
}
