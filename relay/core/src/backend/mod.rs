//! Generation Backends
//!
//! Abstracted access to text generation services through the
//! [`GenerationSource`] trait.
//!
//! # Available Backends
//!
//! - **OpenAI**: any OpenAI-compatible chat completions server (default)
//! - **Echo**: offline, streams the last user message back
//! - **Scripted**: deterministic replay for tests
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{GenerationSource, OpenAiBackend, PromptMessage};
//!
//! let backend = OpenAiBackend::new(base_url, api_key, "gpt-4-turbo-preview", timeout)?;
//! let mut tokens = backend.generate(&[PromptMessage::user("Hello!")]).await?;
//! while let Some(delta) = tokens.next().await { /* ... */ }
//! ```

mod echo;
mod openai;
mod scripted;
mod traits;

pub use echo::EchoBackend;
pub use openai::{OpenAiBackend, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT};
pub use scripted::{ScriptStep, ScriptedBackend};
pub use traits::{BackendKind, GenerationSource, PromptMessage, PromptRole, TokenStream};
