//! Generation Orchestrator - Message In, Reply Out
//!
//! Handles one inbound message end to end:
//!
//! ```text
//!   validate ──► persist user message ──► build context ──► generate
//!                                                              │
//!        persist assistant reply ◄── (success, non-empty) ◄── relay
//! ```
//!
//! Validation failures (`Validation`, `NotFound`, `Conflict`) happen before
//! any frame is published. Once generation starts, the run always ends with
//! exactly one terminal frame, including when the source fails to start.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::backend::{GenerationSource, PromptMessage};
use crate::error::{GenerationError, RelayError};
use crate::registry::TopicKey;
use crate::relay::{RunOutcome, StreamRelay};
use crate::store::{ConversationStore, MessageRole};

/// Default number of stored messages sent as context
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default preamble sent ahead of the conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a warm and empathetic counselor. \
Listen carefully, reflect the person's feelings back to them, and reply with kindness \
and practical encouragement. Keep answers concise and conversational.";

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Stored messages included as context, most recent last
    pub history_limit: usize,
    /// Preamble sent as the first context message
    pub system_prompt: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Runs inbound messages through generation and relay
#[derive(Clone)]
pub struct GenerationOrchestrator {
    store: Arc<dyn ConversationStore>,
    source: Arc<dyn GenerationSource>,
    relay: StreamRelay,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    /// Create an orchestrator
    pub fn new(
        store: Arc<dyn ConversationStore>,
        source: Arc<dyn GenerationSource>,
        relay: StreamRelay,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            source,
            relay,
            config,
        }
    }

    /// Conversation store in use
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Handle one inbound message for `thread_id`
    ///
    /// Returns the assembled reply. Empty replies are returned but not stored.
    pub async fn handle(&self, thread_id: &str, user_content: &str) -> Result<String, RelayError> {
        if user_content.trim().is_empty() {
            return Err(RelayError::Validation("content must not be empty".to_string()));
        }

        let thread = self
            .store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(thread_id.to_string()))?;
        if thread.is_archived() {
            return Err(RelayError::Conflict(thread_id.to_string()));
        }

        self.store
            .append_message(thread_id, MessageRole::User, user_content)
            .await?;

        let context = self.build_context(thread_id).await?;
        let topic = TopicKey::from(thread_id);

        tracing::debug!(
            topic = %topic,
            source = self.source.name(),
            context_messages = context.len(),
            "Starting generation"
        );

        let tokens = match self.source.generate(&context).await {
            Ok(tokens) => tokens,
            // Relayed like a mid-stream failure so followers still see a terminal frame
            Err(err) => stream::once(async move { Err::<String, GenerationError>(err) }).boxed(),
        };

        let run = self.relay.run(&topic, tokens).await;

        match run.outcome {
            RunOutcome::Success => {
                if let Err(err) = self
                    .store
                    .append_message(thread_id, MessageRole::Assistant, &run.text)
                    .await
                {
                    tracing::error!(topic = %topic, error = %err, "Failed to persist reply");
                    return Err(err.into());
                }
                Ok(run.text)
            }
            RunOutcome::Empty => {
                tracing::debug!(topic = %topic, "Empty reply, nothing persisted");
                Ok(run.text)
            }
            RunOutcome::Failed(err) => Err(RelayError::UpstreamGeneration(err)),
        }
    }

    async fn build_context(&self, thread_id: &str) -> Result<Vec<PromptMessage>, RelayError> {
        let history = self
            .store
            .recent_messages(thread_id, self.config.history_limit)
            .await?;

        let mut context = Vec::with_capacity(history.len() + 1);
        context.push(PromptMessage::system(self.config.system_prompt.as_str()));
        context.extend(history.iter().map(PromptMessage::from));
        Ok(context)
    }
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
