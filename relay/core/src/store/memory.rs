//! In-memory conversation store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::models::{ChatMessage, MessageRole, Page, Thread, ThreadStatus};
use super::traits::{ConversationStore, StoreError};

#[derive(Debug)]
struct StoredThread {
    thread: Thread,
    /// Insertion order, breaks creation-time ties
    seq: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    threads: HashMap<String, StoredThread>,
    messages: HashMap<String, Vec<ChatMessage>>,
    /// Message id → owning thread id
    message_threads: HashMap<String, String>,
    next_seq: u64,
}

impl StoreInner {
    /// Owning thread of a message, which must be active to be modified
    fn writable_thread_of(&self, message_id: &str) -> Result<String, StoreError> {
        let thread_id = self
            .message_threads
            .get(message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        match self.threads.get(thread_id) {
            Some(stored) if stored.thread.is_archived() => {
                Err(StoreError::ThreadArchived(thread_id.clone()))
            }
            Some(_) => Ok(thread_id.clone()),
            None => Err(StoreError::ThreadNotFound(thread_id.clone())),
        }
    }
}

/// Process-local store; contents are lost on restart
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Items after `cursor` (by id), at most `limit` of them
fn paginate<T: Clone>(
    items: &[T],
    id_of: impl Fn(&T) -> &str,
    limit: usize,
    cursor: Option<&str>,
) -> Page<T> {
    let start = cursor
        .and_then(|cursor| items.iter().position(|item| id_of(item) == cursor))
        .map_or(0, |pos| pos + 1);

    let page: Vec<T> = items.iter().skip(start).take(limit).cloned().collect();
    let next_cursor = if limit > 0 && page.len() == limit {
        page.last().map(|item| id_of(item).to_string())
    } else {
        None
    };

    Page {
        items: page,
        next_cursor,
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_thread(&self, title: Option<String>) -> Result<Thread, StoreError> {
        let mut inner = self.inner.write();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Thread {}", inner.threads.len() + 1));

        let thread = Thread {
            thread_id: Uuid::new_v4().to_string(),
            title,
            status: ThreadStatus::Active,
            created_at: Utc::now(),
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.threads.insert(
            thread.thread_id.clone(),
            StoredThread {
                thread: thread.clone(),
                seq,
            },
        );
        inner.messages.insert(thread.thread_id.clone(), Vec::new());

        tracing::debug!(thread_id = %thread.thread_id, "Thread created");
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        Ok(self
            .inner
            .read()
            .threads
            .get(thread_id)
            .map(|stored| stored.thread.clone()))
    }

    async fn list_threads(
        &self,
        status: ThreadStatus,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Thread>, StoreError> {
        let inner = self.inner.read();
        let mut matching: Vec<&StoredThread> = inner
            .threads
            .values()
            .filter(|stored| stored.thread.status == status)
            .collect();
        matching.sort_by(|a, b| {
            b.thread
                .created_at
                .cmp(&a.thread.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let threads: Vec<Thread> = matching.into_iter().map(|s| s.thread.clone()).collect();
        Ok(paginate(&threads, |t| t.thread_id.as_str(), limit, cursor))
    }

    async fn update_thread_status(
        &self,
        thread_id: &str,
        status: ThreadStatus,
    ) -> Result<Thread, StoreError> {
        let mut inner = self.inner.write();
        let stored = inner
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        stored.thread.status = status;
        tracing::debug!(thread_id, status = %status, "Thread status updated");
        Ok(stored.thread.clone())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.threads.remove(thread_id).is_none() {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        for message in inner.messages.remove(thread_id).unwrap_or_default() {
            inner.message_threads.remove(&message.id);
        }
        tracing::debug!(thread_id, "Thread deleted");
        Ok(())
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write();
        match inner.threads.get(thread_id) {
            None => return Err(StoreError::ThreadNotFound(thread_id.to_string())),
            Some(stored) if stored.thread.is_archived() => {
                return Err(StoreError::ThreadArchived(thread_id.to_string()));
            }
            Some(_) => {}
        }

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner
            .message_threads
            .insert(message.id.clone(), thread_id.to_string());
        inner
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<ChatMessage>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .message_threads
            .get(message_id)
            .and_then(|thread_id| inner.messages.get(thread_id))
            .and_then(|messages| messages.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write();
        let thread_id = inner.writable_thread_of(message_id)?;
        let message = inner
            .messages
            .get_mut(&thread_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.content = content.to_string();
        tracing::debug!(message_id, thread_id = %thread_id, "Message updated");
        Ok(message.clone())
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let thread_id = inner.writable_thread_of(message_id)?;
        if let Some(messages) = inner.messages.get_mut(&thread_id) {
            messages.retain(|m| m.id != message_id);
        }
        inner.message_threads.remove(message_id);
        tracing::debug!(message_id, thread_id = %thread_id, "Message deleted");
        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<ChatMessage>, StoreError> {
        let inner = self.inner.read();
        if !inner.threads.contains_key(thread_id) {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        let messages = inner.messages.get(thread_id).map_or(&[][..], Vec::as_slice);
        Ok(paginate(messages, |m| m.id.as_str(), limit, cursor))
    }

    async fn recent_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read();
        if !inner.threads.contains_key(thread_id) {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        let messages = inner.messages.get(thread_id).map_or(&[][..], Vec::as_slice);
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
