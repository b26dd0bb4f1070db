//! Conversation persistence
//!
//! The relay only needs to look up a thread, append messages and read recent
//! history; the rest of [`ConversationStore`] backs the daemon's thread
//! endpoints. [`InMemoryStore`] is the bundled implementation.

mod memory;
mod models;
mod traits;

pub use memory::InMemoryStore;
pub use models::{ChatMessage, MessageRole, Page, Thread, ThreadStatus};
pub use traits::{ConversationStore, StoreError};
