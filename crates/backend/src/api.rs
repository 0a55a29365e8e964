//! Contract between the popup and whatever serves the mentor replies.
//!
//! Mirrors the shape of the wire protocol: one POST per exchange, the reply
//! body streamed back as plain text fragments.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use crate::identity::StudentIdentity;

/// Boxed future used by the backend trait so implementations stay
/// object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Background task that pumps one streamed exchange to completion.
pub type BackendWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User-visible text shown when an exchange fails for any reason other than
/// a rejected session.
pub const GENERIC_ERROR_TEXT: &str =
    "An error occurred while processing your request. Please try again.";

/// User-visible text shown when the mentor endpoint rejects the session.
pub const UNAUTHORIZED_ERROR_TEXT: &str = "Your session has expired. Please sign in again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub api_base_url: String,
    pub auth_base_url: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl BackendConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        auth_base_url: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url.into()),
            auth_base_url: normalize_base_url(auth_base_url.into()),
            user_agent: user_agent.into().trim().to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn normalize_base_url(raw: String) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Stream identity carried on every event so late arrivals from a replaced
/// exchange can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub conversation_id: u64,
    pub session_id: u64,
}

impl StreamTarget {
    pub const fn new(conversation_id: u64, session_id: u64) -> Self {
        Self {
            conversation_id,
            session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One history entry in the shape the mentor endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub role: ChatRole,
    pub content: String,
}

impl OutboundMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Exercise scope attached to authenticated submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseScope {
    pub exercise_id: String,
    pub student_code: String,
    pub session_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub target: StreamTarget,
    pub messages: Vec<OutboundMessage>,
    pub exercise_scope: Option<ExerciseScope>,
}

impl StreamRequest {
    pub fn new(target: StreamTarget, messages: Vec<OutboundMessage>) -> Self {
        Self {
            target,
            messages,
            exercise_scope: None,
        }
    }

    pub fn with_exercise_scope(mut self, scope: ExerciseScope) -> Self {
        self.exercise_scope = Some(scope);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    /// Incremental text decoded from the response body.
    Delta(String),
    /// The endpoint finished the reply.
    Done,
    /// The exchange failed; the payload is the user-visible message.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub target: StreamTarget,
    pub payload: StreamEventPayload,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("http client construction failed on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },

    #[snafu(display("stream request has no messages on `{stage}`"))]
    EmptyMessageSet { stage: &'static str },

    #[snafu(display("request to the mentor endpoint failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },

    #[snafu(display("mentor endpoint rejected the session on `{stage}` (HTTP 401)"))]
    Unauthorized { stage: &'static str },

    #[snafu(display("mentor endpoint returned HTTP {status} on `{stage}`"))]
    UpstreamStatus { stage: &'static str, status: u16 },

    #[snafu(display("reading the response stream failed on `{stage}`: {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    /// Collapses any failure into the single message shown in the
    /// conversation. Rejected sessions keep their own text; other upstream
    /// statuses append the code so refusals stay tellable apart.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => UNAUTHORIZED_ERROR_TEXT.to_string(),
            Self::UpstreamStatus { status, .. } => format!("{GENERIC_ERROR_TEXT} (HTTP {status})"),
            _ => GENERIC_ERROR_TEXT.to_string(),
        }
    }
}

/// Receiver half of one streamed exchange.
///
/// Dropping the stream signals the worker to stop, so an abandoned exchange
/// does not keep reading from the network.
pub struct BackendEventStream {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl BackendEventStream {
    pub fn target(&self) -> StreamTarget {
        self.target
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Result<StreamEvent, mpsc::error::TryRecvError> {
        self.events.try_recv()
    }
}

impl Drop for BackendEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Stream plus the worker future that feeds it. The caller decides where
/// the worker runs; events do not flow until it is polled.
pub struct BackendStreamHandle {
    pub stream: BackendEventStream,
    pub worker: BackendWorker,
}

impl std::fmt::Debug for BackendStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendStreamHandle").finish_non_exhaustive()
    }
}

pub trait MentorBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Starts one streamed exchange. Returns the event stream together with
    /// the worker future that drives it.
    fn stream_chat(&self, request: StreamRequest) -> BackendResult<BackendStreamHandle>;

    /// Resolves the signed-in student, if any. Lookup failures of any kind
    /// read as signed out.
    fn fetch_identity<'a>(
        &'a self,
        session_token: &'a str,
    ) -> BoxFuture<'a, Option<StudentIdentity>>;
}

pub(crate) fn make_event_stream(
    target: StreamTarget,
) -> (
    mpsc::UnboundedSender<StreamEvent>,
    BackendEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let stream = BackendEventStream {
        target,
        events: event_rx,
        cancel_tx: Some(cancel_tx),
    };
    (event_tx, stream, cancel_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_keeps_its_own_text() {
        let error = UnauthorizedSnafu { stage: "test" }.build();
        assert_eq!(error.user_message(), UNAUTHORIZED_ERROR_TEXT);
    }

    #[test]
    fn upstream_status_appends_code_to_generic_text() {
        let error = UpstreamStatusSnafu {
            stage: "test",
            status: 503u16,
        }
        .build();
        let message = error.user_message();
        assert!(message.starts_with(GENERIC_ERROR_TEXT), "was: {message}");
        assert!(message.contains("503"), "was: {message}");
    }

    #[test]
    fn other_failures_collapse_to_generic_text() {
        let error = EmptyMessageSetSnafu { stage: "test" }.build();
        assert_eq!(error.user_message(), GENERIC_ERROR_TEXT);
    }

    #[test]
    fn outbound_roles_serialize_lowercase() {
        let message = OutboundMessage::user("hi");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, serde_json::json!({"role": "user", "content": "hi"}));

        let message = OutboundMessage::assistant("hello");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
    }

    #[test]
    fn base_urls_lose_trailing_slashes() {
        let config = BackendConfig::new("https://api.test/v1/", " https://auth.test ", "mentor/0.1");
        assert_eq!(config.api_base_url, "https://api.test/v1");
        assert_eq!(config.auth_base_url, "https://auth.test");
    }
}
