//! Canonical in-memory model for server-pushed session state.
//!
//! This crate owns the wire schema for sessions, messages, message parts,
//! todos, and permissions, plus the reconciliation store that merges pushed
//! events into that model. It intentionally contains no transport code: the
//! store consumes already-decoded [`ServerEvent`] values and exposes a read
//! model that never blocks on the network.

mod events;
mod schema;
mod store;

pub use events::{EventCategory, EventDecodeError, FileWatchKind, ServerEvent};
pub use schema::{
    AgentPart, AssistantMessage, CacheTokens, FilePart, MessageInfo, MessagePart, MessagePath,
    MessageTime, MessageWithParts, PatchPart, Permission, PermissionPattern, PermissionResponse,
    ReasoningPart, RetryPart, Session, SessionRevert, SessionShare, SessionTime, SnapshotPart,
    SpanTime, StepFinishPart, StepStartPart, TextPart, TodoItem, TodoStatus, TokenUsage, ToolPart,
    ToolState, ToolStatus, UserMessage,
};
pub use store::{Applied, StateStore};
