//! Generation Source Traits
//!
//! A generation source turns an ordered, role-tagged conversation into an
//! ordered, finite sequence of text deltas. The relay treats it as opaque:
//! it only pulls deltas until the sequence ends or yields an error.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Ordered text deltas produced by a generation source
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

/// Speaker of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Fixed instructions preceding the conversation
    System,
    /// The human participant
    User,
    /// Previous model output
    Assistant,
}

/// One role-tagged message of generation context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker
    pub role: PromptRole,
    /// Message text
    pub content: String,
}

impl PromptMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Which generation source the daemon drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat completions API
    #[default]
    OpenAi,
    /// Offline echo of the last user message
    Echo,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Echo => write!(f, "echo"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "echo" => Ok(Self::Echo),
            other => Err(format!("unknown backend '{other}' (expected openai or echo)")),
        }
    }
}

/// Source of generated text
#[async_trait]
pub trait GenerationSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Whether the source is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Start generating a reply to `messages`
    ///
    /// Errors returned here happen before any delta is produced; errors
    /// during generation are yielded by the stream.
    async fn generate(&self, messages: &[PromptMessage]) -> Result<TokenStream, GenerationError>;
}
