//! Transport-only client primitives for an opencode-compatible server.
//!
//! This crate owns the streaming event endpoint, the incremental SSE frame
//! parser, and the snapshot/command REST surface. It deliberately holds no
//! state: decoded [`session_state::ServerEvent`] values are handed to the
//! caller, which owns reconciliation and reconnection policy.

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::ServerClient;
pub use config::ApiConfig;
pub use error::ApiError;
pub use payload::{CreateSessionRequest, ModelRef, PromptPart, PromptRequest};
pub use sse::SseFrameParser;
pub use url::normalize_base_url;
