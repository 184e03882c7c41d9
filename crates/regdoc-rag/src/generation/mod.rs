//! Context assembly and grounded answer generation

mod answer;
pub mod prompt;

pub use answer::{AnswerGenerator, GenerationSettings};
pub use prompt::{system_prompt, PromptBuilder};
