//! Streaming state-synchronization engine for opencode-compatible servers.
//!
//! Invariant: one event is merged to completion before the next is examined;
//! the store never exposes a partially-applied frame.
//!
//! # Public API Overview
//! - Construct a [`SyncEngine`] from an [`EngineConfig`] and call
//!   [`SyncEngine::connect`] to start consuming the push stream.
//! - Read reconciled state through [`SyncEngine::store`]; subscribe to typed
//!   events and connection-phase changes for live updates.
//! - Issue commands and seed snapshots through [`SyncEngine::client`] and the
//!   `load_*` helpers.
//!
//! Transport and wire-protocol primitives live in the `opencode_api` crate;
//! the data model and reconciliation rules live in `session_state`.

pub mod engine;
pub mod supervisor;

pub use engine::{EngineConfig, SyncEngine};
pub use supervisor::{ConnectionPhase, ReconnectPolicy, ReconnectSupervisor};

pub use opencode_api::{ApiConfig, ApiError, ServerClient};
pub use session_state::{ServerEvent, StateStore};
