//! Deterministic backend for tests
//!
//! Replays a fixed script of deltas, optionally ending in a failure, and
//! records every prompt it was asked to complete.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use super::traits::{GenerationSource, PromptMessage, TokenStream};
use crate::error::GenerationError;

/// One step of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Yield a delta
    Token(String),
    /// Yield an error, ending the stream
    Fail(GenerationError),
}

/// Backend that replays a script
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    start_error: Option<GenerationError>,
    requests: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedBackend {
    /// Yield `tokens` then complete normally
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: tokens
                .into_iter()
                .map(|t| ScriptStep::Token(t.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Yield `tokens` then fail with `error`
    pub fn failing_after<I, S>(tokens: I, error: GenerationError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut backend = Self::new(tokens);
        backend.steps.push(ScriptStep::Fail(error));
        backend
    }

    /// Refuse to start generating
    #[must_use]
    pub fn failing_to_start(error: GenerationError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::default()
        }
    }

    /// Prompts received so far, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<PromptMessage>> {
        self.requests.lock().clone()
    }

    /// Number of `generate` calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerationSource for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<TokenStream, GenerationError> {
        self.requests.lock().push(messages.to_vec());

        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }

        let items: Vec<Result<String, GenerationError>> = self
            .steps
            .iter()
            .map(|step| match step {
                ScriptStep::Token(text) => Ok(text.clone()),
                ScriptStep::Fail(err) => Err(err.clone()),
            })
            .collect();

        Ok(stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_script_and_records_prompt() {
        let backend = ScriptedBackend::failing_after(["a"], GenerationError::Stream("x".into()));
        let items: Vec<_> = backend
            .generate(&[PromptMessage::user("hi")])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            items,
            vec![Ok("a".to_string()), Err(GenerationError::Stream("x".into()))]
        );
        assert_eq!(backend.requests(), vec![vec![PromptMessage::user("hi")]]);
    }

    #[tokio::test]
    async fn test_failing_to_start() {
        let backend = ScriptedBackend::failing_to_start(GenerationError::Request("down".into()));
        assert!(backend.generate(&[]).await.is_err());
        assert_eq!(backend.call_count(), 1);
    }
}
