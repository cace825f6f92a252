use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::{
    MessageInfo, MessagePart, Permission, PermissionResponse, Session, TodoItem,
};

/// Typed server push event, decoded from a `{"type", "properties"}` frame.
///
/// The union is closed: known types with an invalid `properties` shape are
/// decode errors, while unknown types are skipped entirely so new server
/// event kinds never break the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// First event emitted after the stream opens.
    ServerConnected,
    SessionCreated {
        info: Session,
    },
    SessionUpdated {
        info: Session,
    },
    SessionDeleted {
        info: Session,
    },
    SessionError {
        session_id: Option<String>,
        error: Value,
    },
    SessionIdle {
        session_id: String,
    },
    SessionCompacted {
        session_id: String,
    },
    MessageUpdated {
        info: MessageInfo,
    },
    MessageRemoved {
        session_id: String,
        message_id: String,
    },
    MessagePartUpdated {
        part: MessagePart,
        /// Newly produced text since the previous event for the same part.
        delta: Option<String>,
    },
    MessagePartRemoved {
        session_id: String,
        message_id: String,
        part_id: String,
    },
    TodoUpdated {
        session_id: String,
        todos: Vec<TodoItem>,
    },
    PermissionUpdated(Permission),
    PermissionReplied {
        session_id: String,
        permission_id: String,
        response: PermissionResponse,
    },
    FileEdited {
        file: String,
    },
    FileWatcherUpdated {
        file: String,
        event: FileWatchKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileWatchKind {
    Add,
    Change,
    Unlink,
}

/// Routing category for consumers that only care about one kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Lifecycle,
    Session,
    Message,
    MessagePart,
    Todo,
    Permission,
    FileWatch,
    Error,
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("malformed event frame: {source}")]
    Envelope {
        #[source]
        source: serde_json::Error,
    },

    #[error("event '{kind}' has invalid properties: {source}")]
    InvalidProperties {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Value,
}

#[derive(Debug, Deserialize)]
struct InfoProps<T> {
    info: T,
}

#[derive(Debug, Deserialize)]
struct SessionErrorProps {
    #[serde(rename = "sessionID", default)]
    session_id: Option<String>,
    #[serde(default)]
    error: Value,
}

#[derive(Debug, Deserialize)]
struct SessionRefProps {
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageRefProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "messageID")]
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct PartUpdatedProps {
    part: MessagePart,
    #[serde(default)]
    delta: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PartRemovedProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "messageID")]
    message_id: String,
    #[serde(rename = "partID")]
    part_id: String,
}

#[derive(Debug, Deserialize)]
struct TodoProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(default)]
    todos: Vec<TodoItem>,
}

#[derive(Debug, Deserialize)]
struct PermissionRepliedProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "permissionID")]
    permission_id: String,
    response: PermissionResponse,
}

#[derive(Debug, Deserialize)]
struct FileProps {
    file: String,
}

#[derive(Debug, Deserialize)]
struct FileWatchProps {
    file: String,
    event: FileWatchKind,
}

impl ServerEvent {
    /// Decode one frame payload. `Ok(None)` means the type is unrecognized
    /// and the frame should be ignored.
    pub fn decode(payload: &str) -> Result<Option<Self>, EventDecodeError> {
        let envelope = serde_json::from_str::<EventEnvelope>(payload)
            .map_err(|source| EventDecodeError::Envelope { source })?;
        Self::from_envelope(&envelope.kind, envelope.properties)
    }

    fn from_envelope(kind: &str, properties: Value) -> Result<Option<Self>, EventDecodeError> {
        let event = match kind {
            "server.connected" => Self::ServerConnected,
            "session.created" => {
                let props: InfoProps<Session> = decode_props(kind, properties)?;
                Self::SessionCreated { info: props.info }
            }
            "session.updated" => {
                let props: InfoProps<Session> = decode_props(kind, properties)?;
                Self::SessionUpdated { info: props.info }
            }
            "session.deleted" => {
                let props: InfoProps<Session> = decode_props(kind, properties)?;
                Self::SessionDeleted { info: props.info }
            }
            "session.error" => {
                let props: SessionErrorProps = decode_props(kind, properties)?;
                Self::SessionError {
                    session_id: props.session_id,
                    error: props.error,
                }
            }
            "session.idle" => {
                let props: SessionRefProps = decode_props(kind, properties)?;
                Self::SessionIdle {
                    session_id: props.session_id,
                }
            }
            "session.compacted" => {
                let props: SessionRefProps = decode_props(kind, properties)?;
                Self::SessionCompacted {
                    session_id: props.session_id,
                }
            }
            "message.updated" => {
                let props: InfoProps<MessageInfo> = decode_props(kind, properties)?;
                Self::MessageUpdated { info: props.info }
            }
            "message.removed" => {
                let props: MessageRefProps = decode_props(kind, properties)?;
                Self::MessageRemoved {
                    session_id: props.session_id,
                    message_id: props.message_id,
                }
            }
            "message.part.updated" => {
                let props: PartUpdatedProps = decode_props(kind, properties)?;
                Self::MessagePartUpdated {
                    part: props.part,
                    delta: props.delta,
                }
            }
            "message.part.removed" => {
                let props: PartRemovedProps = decode_props(kind, properties)?;
                Self::MessagePartRemoved {
                    session_id: props.session_id,
                    message_id: props.message_id,
                    part_id: props.part_id,
                }
            }
            "todo.updated" => {
                let props: TodoProps = decode_props(kind, properties)?;
                Self::TodoUpdated {
                    session_id: props.session_id,
                    todos: props.todos,
                }
            }
            "permission.updated" => {
                let permission: Permission = decode_props(kind, properties)?;
                Self::PermissionUpdated(permission)
            }
            "permission.replied" => {
                let props: PermissionRepliedProps = decode_props(kind, properties)?;
                Self::PermissionReplied {
                    session_id: props.session_id,
                    permission_id: props.permission_id,
                    response: props.response,
                }
            }
            "file.edited" => {
                let props: FileProps = decode_props(kind, properties)?;
                Self::FileEdited { file: props.file }
            }
            "file.watcher.updated" => {
                let props: FileWatchProps = decode_props(kind, properties)?;
                Self::FileWatcherUpdated {
                    file: props.file,
                    event: props.event,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::ServerConnected => EventCategory::Lifecycle,
            Self::SessionCreated { .. }
            | Self::SessionUpdated { .. }
            | Self::SessionDeleted { .. }
            | Self::SessionIdle { .. }
            | Self::SessionCompacted { .. } => EventCategory::Session,
            Self::SessionError { .. } => EventCategory::Error,
            Self::MessageUpdated { .. } | Self::MessageRemoved { .. } => EventCategory::Message,
            Self::MessagePartUpdated { .. } | Self::MessagePartRemoved { .. } => {
                EventCategory::MessagePart
            }
            Self::TodoUpdated { .. } => EventCategory::Todo,
            Self::PermissionUpdated(_) | Self::PermissionReplied { .. } => {
                EventCategory::Permission
            }
            Self::FileEdited { .. } | Self::FileWatcherUpdated { .. } => EventCategory::FileWatch,
        }
    }

    /// Session the event belongs to, when it names one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ServerConnected | Self::FileEdited { .. } | Self::FileWatcherUpdated { .. } => {
                None
            }
            Self::SessionCreated { info }
            | Self::SessionUpdated { info }
            | Self::SessionDeleted { info } => Some(&info.id),
            Self::SessionError { session_id, .. } => session_id.as_deref(),
            Self::SessionIdle { session_id } | Self::SessionCompacted { session_id } => {
                Some(session_id)
            }
            Self::MessageUpdated { info } => Some(info.session_id()),
            Self::MessageRemoved { session_id, .. } => Some(session_id),
            Self::MessagePartUpdated { part, .. } => Some(part.session_id()),
            Self::MessagePartRemoved { session_id, .. } => Some(session_id),
            Self::TodoUpdated { session_id, .. } => Some(session_id),
            Self::PermissionUpdated(permission) => Some(&permission.session_id),
            Self::PermissionReplied { session_id, .. } => Some(session_id),
        }
    }
}

fn decode_props<T: DeserializeOwned>(
    kind: &str,
    properties: Value,
) -> Result<T, EventDecodeError> {
    serde_json::from_value(properties).map_err(|source| EventDecodeError::InvalidProperties {
        kind: kind.to_owned(),
        source,
    })
}
