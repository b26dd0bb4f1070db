//! Router and shared state
//!
//! Builds the relay from a resolved [`RelayConfigFile`] and mounts the HTTP
//! surface on top of it:
//!
//! ```text
//!   GET  /api/chat/stream ──► SubscriberConnection ──► SSE body
//!   POST /api/chat/messages ──► GenerationOrchestrator ──► StreamRelay
//!                                                              │
//!                                      TopicRegistry ◄── BroadcastChannel
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, Method};
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use relay_core::backend::{BackendKind, EchoBackend, GenerationSource, OpenAiBackend};
use relay_core::config::RelayConfigFile;
use relay_core::store::{ConversationStore, InMemoryStore};
use relay_core::{
    BroadcastChannel, GenerationError, GenerationOrchestrator, OrchestratorConfig, StreamRelay,
    TopicRegistry,
};

use crate::handlers;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Live subscribers per thread
    pub registry: TopicRegistry,
    /// Message-in, reply-out use case
    pub orchestrator: Arc<GenerationOrchestrator>,
    /// Thread and message persistence
    pub store: Arc<dyn ConversationStore>,
    /// Frames buffered per subscriber before old tokens are dropped
    pub queue_capacity: usize,
    /// Interval between keep-alive comments on open streams
    pub keepalive: Duration,
}

impl AppState {
    /// Wire the relay from explicit parts
    pub fn new(
        store: Arc<dyn ConversationStore>,
        source: Arc<dyn GenerationSource>,
        config: &RelayConfigFile,
    ) -> Self {
        let registry = TopicRegistry::new();
        let relay = StreamRelay::new(BroadcastChannel::new(registry.clone()));
        let orchestrator = GenerationOrchestrator::new(
            store.clone(),
            source,
            relay,
            OrchestratorConfig {
                history_limit: config.relay.history_limit,
                system_prompt: config.relay.system_prompt.clone(),
            },
        );

        Self {
            registry,
            orchestrator: Arc::new(orchestrator),
            store,
            queue_capacity: config.relay.subscriber_queue_capacity,
            keepalive: config.keepalive_interval(),
        }
    }

    /// Wire the relay with an in-memory store and the configured backend
    pub fn from_config(config: &RelayConfigFile) -> Result<Self, GenerationError> {
        let source = build_source(config)?;
        Ok(Self::new(Arc::new(InMemoryStore::new()), source, config))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("orchestrator", &self.orchestrator)
            .field("queue_capacity", &self.queue_capacity)
            .field("keepalive", &self.keepalive)
            .finish_non_exhaustive()
    }
}

/// Instantiate the generation backend named in the config
pub fn build_source(config: &RelayConfigFile) -> Result<Arc<dyn GenerationSource>, GenerationError> {
    let generation = &config.generation;
    match generation.backend {
        BackendKind::OpenAi => {
            if generation.api_key.is_none() {
                tracing::warn!("No API key configured, upstream requests will be unauthenticated");
            }
            let backend = OpenAiBackend::new(
                generation.base_url.as_str(),
                generation.api_key.clone(),
                generation.model.as_str(),
                generation.request_timeout(),
            )?;
            info!(
                base_url = %generation.base_url,
                model = %generation.model,
                "Using OpenAI-compatible backend"
            );
            Ok(Arc::new(backend))
        }
        BackendKind::Echo => {
            info!("Using echo backend");
            Ok(Arc::new(EchoBackend::new()))
        }
    }
}

/// Create the application router
pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/chat/stream", get(handlers::subscribe))
        .route("/api/chat/messages", post(handlers::post_message))
        .route(
            "/api/chat/messages/{message_id}",
            patch(handlers::update_message).delete(handlers::delete_message),
        )
        .route(
            "/api/chat/threads",
            get(handlers::list_threads).post(handlers::create_thread),
        )
        .route(
            "/api/chat/threads/{thread_id}",
            get(handlers::get_thread)
                .patch(handlers::update_thread)
                .delete(handlers::delete_thread),
        )
        .route(
            "/api/threads/{thread_id}/messages",
            get(handlers::list_messages),
        )
        .layer(trace_layer)
        .layer(build_cors_layer())
        .with_state(state)
}

/// Mirror the request origin, credentials allowed
fn build_cors_layer() -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static("x-requested-with"),
    ];

    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::backend::ScriptedBackend;

    #[test]
    fn test_state_takes_settings_from_config() {
        let mut config = RelayConfigFile::new();
        config.relay.subscriber_queue_capacity = 7;
        config.server.keepalive_secs = 3;

        let state = AppState::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ScriptedBackend::new(["x"])),
            &config,
        );
        assert_eq!(state.queue_capacity, 7);
        assert_eq!(state.keepalive, Duration::from_secs(3));
        assert_eq!(state.registry.topic_count(), 0);
    }

    #[test]
    fn test_echo_backend_from_config() {
        let mut config = RelayConfigFile::new();
        config.generation.backend = BackendKind::Echo;
        let source = build_source(&config).unwrap();
        assert_eq!(source.name(), "Echo");
    }
}
