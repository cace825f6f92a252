use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use session_state::{
    MessageWithParts, PermissionResponse, Session, TodoItem,
};

use crate::config::ApiConfig;
use crate::error::{parse_error_message, ApiError};
use crate::payload::{CreateSessionRequest, PromptRequest};
use crate::url::{event_stream_url, normalize_base_url};

/// Typed client for an opencode-compatible server.
///
/// One instance serves both surfaces: the long-lived event stream that feeds
/// reconciliation, and the snapshot/command REST endpoints used to seed the
/// store and issue user commands.
#[derive(Debug)]
pub struct ServerClient {
    http: Client,
    config: ApiConfig,
    base_url: String,
}

#[derive(Serialize)]
struct PermissionReplyBody {
    response: PermissionResponse,
}

#[derive(Serialize)]
struct RevertBody<'a> {
    #[serde(rename = "messageID")]
    message_id: &'a str,
}

#[derive(Serialize)]
struct Empty {}

impl ServerClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url);
        let http = Client::builder().build().map_err(ApiError::from)?;
        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open the server push stream.
    ///
    /// Returns the raw streaming response; the caller drives its byte stream
    /// through [`crate::SseFrameParser`]. No timeout is applied: the stream
    /// is expected to stay open until either side closes it.
    pub async fn open_event_stream(&self) -> Result<Response, ApiError> {
        let url = event_stream_url(&self.base_url);
        debug!(%url, "opening event stream");
        let request = self
            .apply_extra_headers(self.http.get(&url))
            .header(ACCEPT, "text/event-stream");
        let response = request.send().await.map_err(ApiError::from)?;
        Self::check_status(response).await
    }

    // ---- sessions ----

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.get_json("/session").await
    }

    pub async fn get_session(&self, id: &str) -> Result<Session, ApiError> {
        self.get_json(&format!("/session/{id}")).await
    }

    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, ApiError> {
        self.post_json("/session", request).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<bool, ApiError> {
        let response = self
            .send(self.apply_config(self.http.delete(self.endpoint(&format!("/session/{id}")))))
            .await?;
        response.json().await.map_err(ApiError::from)
    }

    pub async fn abort_session(&self, id: &str) -> Result<bool, ApiError> {
        self.post_json(&format!("/session/{id}/abort"), &Empty {}).await
    }

    pub async fn revert_session(&self, id: &str, message_id: &str) -> Result<Session, ApiError> {
        self.post_json(
            &format!("/session/{id}/revert"),
            &RevertBody { message_id },
        )
        .await
    }

    pub async fn unrevert_session(&self, id: &str) -> Result<Session, ApiError> {
        self.post_json(&format!("/session/{id}/unrevert"), &Empty {})
            .await
    }

    // ---- messages ----

    pub async fn list_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<MessageWithParts>, ApiError> {
        self.get_json(&format!("/session/{session_id}/message")).await
    }

    /// Post a new user turn. The resulting transcript arrives over the event
    /// stream, so the response body is not interpreted here.
    pub async fn send_prompt(
        &self,
        session_id: &str,
        request: &PromptRequest,
    ) -> Result<(), ApiError> {
        let builder = self
            .apply_config(self.http.post(self.endpoint(&format!("/session/{session_id}/message"))))
            .json(request);
        self.send(builder).await.map(|_| ())
    }

    // ---- todos ----

    pub async fn list_todos(&self, session_id: &str) -> Result<Vec<TodoItem>, ApiError> {
        self.get_json(&format!("/session/{session_id}/todo")).await
    }

    // ---- permissions ----

    pub async fn respond_permission(
        &self,
        session_id: &str,
        permission_id: &str,
        response: PermissionResponse,
    ) -> Result<bool, ApiError> {
        self.post_json(
            &format!("/session/{session_id}/permissions/{permission_id}"),
            &PermissionReplyBody { response },
        )
        .await
    }

    // ---- plumbing ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn apply_config(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = self.apply_extra_headers(builder);
        match self.config.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn apply_extra_headers(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (key, value) in &self.config.extra_headers {
            builder = builder.header(key, value);
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .send(self.apply_config(self.http.get(self.endpoint(path))))
            .await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send(self.apply_config(self.http.post(self.endpoint(path))).json(body))
            .await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(ApiError::from)?;
        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| String::new());
        Err(ApiError::Status(status, parse_error_message(status, &body)))
    }
}
