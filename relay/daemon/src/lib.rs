//! Relay Daemon - HTTP and Server-Sent Events Surface
//!
//! Exposes [`relay_core`] over HTTP: clients follow a thread with
//! `GET /api/chat/stream?threadId=` and trigger replies with
//! `POST /api/chat/messages`. Thread management endpoints sit alongside.
//!
//! The router is built by [`build_router`] so tests can drive it without
//! binding a socket.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use server::{build_router, build_source, AppState};
