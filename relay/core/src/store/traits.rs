//! Conversation store interface

use async_trait::async_trait;
use thiserror::Error;

use super::models::{ChatMessage, MessageRole, Page, Thread, ThreadStatus};

/// Failure of a conversation store operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No thread with this id
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// No message with this id
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// The thread is archived and read-only
    #[error("thread is archived: {0}")]
    ThreadArchived(String),

    /// The backing storage failed
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence for threads and their messages
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an active thread; `title` defaults to `Thread <n>`
    async fn create_thread(&self, title: Option<String>) -> Result<Thread, StoreError>;

    /// Look up a thread
    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, StoreError>;

    /// Threads with `status`, newest first
    async fn list_threads(
        &self,
        status: ThreadStatus,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Thread>, StoreError>;

    /// Change a thread's status
    async fn update_thread_status(
        &self,
        thread_id: &str,
        status: ThreadStatus,
    ) -> Result<Thread, StoreError>;

    /// Remove a thread and its messages
    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError>;

    /// Append a message to an active thread
    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// Look up a message by id
    async fn get_message(&self, message_id: &str) -> Result<Option<ChatMessage>, StoreError>;

    /// Replace a message's content; its thread must be active
    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// Remove a message; its thread must be active
    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError>;

    /// Messages of a thread, oldest first
    async fn list_messages(
        &self,
        thread_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<ChatMessage>, StoreError>;

    /// The last `limit` messages of a thread, oldest first
    async fn recent_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}
