//! Offline backend that streams the last user message back word by word

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::traits::{GenerationSource, PromptMessage, PromptRole, TokenStream};
use crate::error::GenerationError;

/// Echoes the most recent user message
///
/// Lets the daemon run end to end without credentials or network access.
#[derive(Debug, Clone, Default)]
pub struct EchoBackend;

impl EchoBackend {
    /// Create an echo backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerationSource for EchoBackend {
    fn name(&self) -> &str {
        "Echo"
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<TokenStream, GenerationError> {
        let text = messages
            .iter()
            .rev()
            .find(|m| m.role == PromptRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let words: Vec<Result<String, GenerationError>> = text
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();

        Ok(stream::iter(words).boxed())
    }
}
