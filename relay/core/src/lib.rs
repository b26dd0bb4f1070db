//! Relay Core - Topic-Based Token Broadcast
//!
//! This crate relays incrementally generated text to every client following a
//! conversation thread, while persisting the assembled reply. It is
//! independent of any HTTP framework; the daemon crate wires it to
//! server-sent events.
//!
//! # Architecture
//!
//! ```text
//!  POST message                                   GET stream (per client)
//!       │                                                  │
//! ┌─────▼────────────────────┐                 ┌───────────▼───────────┐
//! │ GenerationOrchestrator   │                 │ SubscriberConnection  │
//! │  validate → persist →    │                 │  bounded queue +      │
//! │  generate → persist      │                 │  delivery task        │
//! └─────┬────────────────────┘                 └───────────▲───────────┘
//!       │ TokenStream                                      │ offer()
//! ┌─────▼────────────┐   publish()   ┌──────────────────┐  │
//! │   StreamRelay    ├──────────────►│ BroadcastChannel ├──┘
//! │ one terminal     │               │ snapshot fan-out │
//! │ frame per run    │               └────────┬─────────┘
//! └──────────────────┘                        │ snapshot()
//!                                    ┌────────▼─────────┐
//!                                    │  TopicRegistry   │
//!                                    │ topic → subs     │
//!                                    └──────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`TopicRegistry`]: concurrency-safe topic → subscriber sets
//! - [`BroadcastChannel`]: snapshot-at-publish fan-out
//! - [`SubscriberConnection`]: one live delivery destination
//! - [`StreamRelay`]: drives one generation run, one terminal frame
//! - [`GenerationOrchestrator`]: the message-in, reply-out use case
//! - [`Frame`]: the unit of broadcast and its event-stream encoding
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use relay_core::{
//!     backend::EchoBackend, store::InMemoryStore, BroadcastChannel, ChannelSink,
//!     GenerationOrchestrator, OrchestratorConfig, StreamRelay, SubscriberConnection,
//!     TopicKey, TopicRegistry,
//! };
//!
//! let registry = TopicRegistry::new();
//! let relay = StreamRelay::new(BroadcastChannel::new(registry.clone()));
//! let store = Arc::new(InMemoryStore::new());
//! let orchestrator = GenerationOrchestrator::new(
//!     store.clone(),
//!     Arc::new(EchoBackend::new()),
//!     relay,
//!     OrchestratorConfig::default(),
//! );
//!
//! let thread = store.create_thread(None).await?;
//! let (sink, mut frames) = ChannelSink::channel(16);
//! let _conn = SubscriberConnection::open(&registry, TopicKey::from(thread.thread_id.as_str()), sink, 256);
//!
//! let reply = orchestrator.handle(&thread.thread_id, "hello there").await?;
//! while let Some(frame) = frames.recv().await {
//!     print!("{}", frame.encode());
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod frame;
pub mod orchestrator;
pub mod registry;
pub mod relay;
pub mod store;
pub mod subscriber;

pub use broadcast::{BroadcastChannel, BroadcastResult};
pub use error::{DeliveryError, GenerationError, RelayError};
pub use frame::Frame;
pub use orchestrator::{GenerationOrchestrator, OrchestratorConfig};
pub use registry::{SubscriberId, SubscriptionHandle, TopicKey, TopicRegistry};
pub use relay::{GenerationRun, RunOutcome, StreamRelay};
pub use subscriber::{
    ChannelSink, ConnectionState, DeliveryReport, FrameSink, SubscriberConnection,
    TerminationReason,
};
