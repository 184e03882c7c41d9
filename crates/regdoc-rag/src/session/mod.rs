//! Conversation memory, one per session

mod memory;
mod store;

pub use memory::{ConversationMemory, Turn};
pub use store::{SessionHandle, SessionStore};
