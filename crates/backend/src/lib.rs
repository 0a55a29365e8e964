use std::sync::Arc;

pub mod api;
pub mod decode;
pub mod http;
pub mod identity;
pub mod scripted;

pub use api::{
    BackendConfig, BackendError, BackendEventStream, BackendResult, BackendStreamHandle,
    BackendWorker, BoxFuture, ChatRole, DEFAULT_CONNECT_TIMEOUT, ExerciseScope,
    GENERIC_ERROR_TEXT, MentorBackend, OutboundMessage, StreamEvent, StreamEventPayload,
    StreamRequest, StreamTarget, UNAUTHORIZED_ERROR_TEXT,
};
pub use decode::Utf8StreamDecoder;
pub use http::HttpBackend;
pub use identity::StudentIdentity;
pub use scripted::{ScriptedBackend, ScriptedEnding};

/// Builds the HTTP backend for `config` behind the trait object the popup
/// holds.
pub fn create_backend(config: BackendConfig) -> BackendResult<Arc<dyn MentorBackend>> {
    Ok(Arc::new(HttpBackend::new(config)?))
}
