use std::collections::HashMap;

use tracing::{debug, warn};

use crate::events::ServerEvent;
use crate::schema::{
    MessageInfo, MessagePart, MessageWithParts, Permission, Session, TodoItem,
};

/// Outcome of applying one event to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The event mutated the store.
    Merged,
    /// The event carried no store mutation (lifecycle, file-watch, errors).
    Ignored,
    /// A part update arrived before its owning message and was dropped.
    DroppedOrphanPart,
}

/// Canonical in-memory model of the server's session state.
///
/// All merge rules are total: no event, however malformed in intent, makes
/// `apply` panic or leaves the store unusable. Construct one store per
/// stream; instances are independent and carry no global state.
#[derive(Debug, Default)]
pub struct StateStore {
    sessions: Vec<Session>,
    current_session_id: Option<String>,
    messages: HashMap<String, Vec<MessageWithParts>>,
    todos: HashMap<String, Vec<TodoItem>>,
    permissions: HashMap<String, Vec<Permission>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded event into the model.
    pub fn apply(&mut self, event: &ServerEvent) -> Applied {
        match event {
            ServerEvent::SessionCreated { info } | ServerEvent::SessionUpdated { info } => {
                self.upsert_session(info.clone());
                Applied::Merged
            }
            ServerEvent::SessionDeleted { info } => {
                self.remove_session(&info.id);
                Applied::Merged
            }
            ServerEvent::MessageUpdated { info } => {
                self.upsert_message(info.clone());
                Applied::Merged
            }
            ServerEvent::MessageRemoved {
                session_id,
                message_id,
            } => {
                self.remove_message(session_id, message_id);
                Applied::Merged
            }
            ServerEvent::MessagePartUpdated { part, delta } => {
                self.update_message_part(part.clone(), delta.as_deref())
            }
            ServerEvent::MessagePartRemoved {
                session_id,
                message_id,
                part_id,
            } => {
                self.remove_message_part(session_id, message_id, part_id);
                Applied::Merged
            }
            ServerEvent::TodoUpdated { session_id, todos } => {
                self.set_todos(session_id, todos.clone());
                Applied::Merged
            }
            ServerEvent::PermissionUpdated(permission) => {
                self.upsert_permission(permission.clone());
                Applied::Merged
            }
            ServerEvent::PermissionReplied {
                session_id,
                permission_id,
                ..
            } => {
                self.remove_permission(session_id, permission_id);
                Applied::Merged
            }
            // Lifecycle and pass-through events carry no store mutation;
            // consumers observe them on the event fan-out instead.
            ServerEvent::ServerConnected
            | ServerEvent::SessionError { .. }
            | ServerEvent::SessionIdle { .. }
            | ServerEvent::SessionCompacted { .. }
            | ServerEvent::FileEdited { .. }
            | ServerEvent::FileWatcherUpdated { .. } => Applied::Ignored,
        }
    }

    // ---- sessions ----

    /// Insert or replace a session record by id. The wire always carries the
    /// full record, so replacement is the merge.
    pub fn upsert_session(&mut self, info: Session) {
        match self.sessions.iter_mut().find(|s| s.id == info.id) {
            Some(existing) => *existing = info,
            None => self.sessions.push(info),
        }
    }

    /// Remove a session and cascade-remove everything it owns.
    pub fn remove_session(&mut self, id: &str) {
        self.sessions.retain(|s| s.id != id);
        self.messages.remove(id);
        self.todos.remove(id);
        self.permissions.remove(id);
        if self.current_session_id.as_deref() == Some(id) {
            self.current_session_id = None;
        }
        debug!(session = id, "session removed with owned state");
    }

    pub fn set_sessions(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Select the session the consumer is focused on. The reference is by
    /// identity: later `session.updated` events keep it fresh automatically.
    pub fn set_current_session(&mut self, id: Option<&str>) {
        self.current_session_id = id.map(str::to_owned);
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current_session_id
            .as_deref()
            .and_then(|id| self.session(id))
    }

    // ---- messages ----

    /// Upsert a message header by `(session_id, id)`.
    ///
    /// This is the only path that creates a message, because only the
    /// message-level event carries the role. A created message starts with no
    /// parts; part events fill it in.
    pub fn upsert_message(&mut self, info: MessageInfo) {
        let session_id = info.session_id().to_owned();
        let messages = self.messages.entry(session_id).or_default();
        match messages.iter_mut().find(|m| m.info.id() == info.id()) {
            Some(existing) => existing.info = info,
            None => messages.push(MessageWithParts {
                info,
                parts: Vec::new(),
            }),
        }
    }

    pub fn remove_message(&mut self, session_id: &str, message_id: &str) {
        if let Some(messages) = self.messages.get_mut(session_id) {
            messages.retain(|m| m.info.id() != message_id);
        }
    }

    /// Replace a session's message list from a snapshot fetch.
    pub fn set_messages(&mut self, session_id: &str, messages: Vec<MessageWithParts>) {
        self.messages.insert(session_id.to_owned(), messages);
    }

    pub fn messages(&self, session_id: &str) -> &[MessageWithParts] {
        self.messages
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Merge an incoming part, accumulating streamed deltas.
    ///
    /// A part whose owning message is not in the store yet is dropped: a
    /// placeholder message would lack its role and corrupt the role-typed
    /// model. The message-level event is expected to precede its parts.
    pub fn update_message_part(&mut self, part: MessagePart, delta: Option<&str>) -> Applied {
        let session_id = part.session_id().to_owned();
        let message_id = part.message_id().to_owned();

        let Some(message) = self
            .messages
            .get_mut(&session_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.info.id() == message_id))
        else {
            warn!(
                session = %session_id,
                message = %message_id,
                part = part.id(),
                "dropping part for unknown message; waiting for message.updated"
            );
            return Applied::DroppedOrphanPart;
        };

        match message.parts.iter_mut().find(|p| p.id() == part.id()) {
            Some(existing) => *existing = merge_part(existing, part, delta),
            // First sight of this part: append, preserving arrival order.
            None => message.parts.push(part),
        }
        Applied::Merged
    }

    pub fn remove_message_part(&mut self, session_id: &str, message_id: &str, part_id: &str) {
        if let Some(message) = self
            .messages
            .get_mut(session_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.info.id() == message_id))
        {
            message.parts.retain(|p| p.id() != part_id);
        }
    }

    // ---- todos ----

    /// The server always sends the complete current list; no item-level merge.
    pub fn set_todos(&mut self, session_id: &str, todos: Vec<TodoItem>) {
        self.todos.insert(session_id.to_owned(), todos);
    }

    pub fn todos(&self, session_id: &str) -> &[TodoItem] {
        self.todos
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // ---- permissions ----

    pub fn upsert_permission(&mut self, permission: Permission) {
        let pending = self
            .permissions
            .entry(permission.session_id.clone())
            .or_default();
        match pending.iter_mut().find(|p| p.id == permission.id) {
            Some(existing) => *existing = permission,
            None => pending.push(permission),
        }
    }

    pub fn remove_permission(&mut self, session_id: &str, permission_id: &str) {
        if let Some(pending) = self.permissions.get_mut(session_id) {
            pending.retain(|p| p.id != permission_id);
        }
    }

    pub fn permissions(&self, session_id: &str) -> &[Permission] {
        self.permissions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // ---- derived state ----

    /// True while the most recent message is an assistant turn holding a tool
    /// invocation that has not finished. Recomputed per call; never cached.
    pub fn is_assistant_responding(&self, session_id: &str) -> bool {
        let Some(last) = self.messages(session_id).last() else {
            return false;
        };
        if !last.info.is_assistant() {
            return false;
        }
        last.parts.iter().any(|part| match part {
            MessagePart::Tool(tool) => tool.state.status.is_unfinished(),
            _ => false,
        })
    }
}

/// Type-specific part merge.
///
/// Text and reasoning parts grow by exactly the delta: the cumulative `text`
/// on the incoming record may be stale mid-stream, so it is never trusted
/// when a delta is present. There is no sequence number on deltas, so an
/// at-least-once redelivery after a reconnect would duplicate text; that
/// matches the server's observed contract and is deliberately not papered
/// over here.
fn merge_part(existing: &MessagePart, incoming: MessagePart, delta: Option<&str>) -> MessagePart {
    let delta = delta.filter(|d| !d.is_empty());

    match incoming {
        MessagePart::Text(mut part) => {
            if let Some(delta) = delta {
                let accumulated = match existing {
                    MessagePart::Text(prior) => prior.text.as_str(),
                    _ => "",
                };
                part.text = format!("{accumulated}{delta}");
            }
            MessagePart::Text(part)
        }
        MessagePart::Reasoning(mut part) => {
            if let Some(delta) = delta {
                let accumulated = match existing {
                    MessagePart::Reasoning(prior) => prior.text.as_str(),
                    _ => "",
                };
                part.text = format!("{accumulated}{delta}");
            }
            MessagePart::Reasoning(part)
        }
        MessagePart::Tool(mut part) => {
            // The execution state is an atomic snapshot and always wins; outer
            // fields the update leaves unset are kept from the prior record.
            if part.metadata.is_none() {
                if let MessagePart::Tool(prior) = existing {
                    part.metadata = prior.metadata.clone();
                }
            }
            MessagePart::Tool(part)
        }
        // Every other part type is last-write-wins.
        other => other,
    }
}
