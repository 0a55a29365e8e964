//! Backend that talks to the real mentor endpoint over HTTP.
//!
//! One exchange is one POST to `{api_base_url}/ai`; the reply streams back
//! as plain text and is re-published as delta events until the body ends.

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use snafu::{IntoError, ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use crate::api::{
    BackendConfig, BackendError, BackendResult, BackendStreamHandle, BoxFuture, BuildClientSnafu,
    EmptyMessageSetSnafu, MentorBackend, OutboundMessage, ReadBodySnafu, StreamEvent,
    StreamEventPayload, StreamRequest, StreamTarget, TransportSnafu, UnauthorizedSnafu,
    UpstreamStatusSnafu, make_event_stream,
};
use crate::decode::Utf8StreamDecoder;
use crate::identity::{self, StudentIdentity};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestBody<'a> {
    messages: &'a [OutboundMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    exercise_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_code: Option<&'a str>,
}

pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()
            .context(BuildClientSnafu {
                stage: "build-http-client",
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn open_stream(
        client: &reqwest::Client,
        config: &BackendConfig,
        request: &StreamRequest,
    ) -> BackendResult<reqwest::Response> {
        let body = ChatRequestBody {
            messages: &request.messages,
            exercise_id: request
                .exercise_scope
                .as_ref()
                .map(|scope| scope.exercise_id.as_str()),
            student_code: request
                .exercise_scope
                .as_ref()
                .map(|scope| scope.student_code.as_str()),
        };

        let mut outbound = client
            .post(format!("{}/ai", config.api_base_url))
            .json(&body);
        if let Some(scope) = &request.exercise_scope {
            // The endpoint expects the token percent-encoded, with no scheme
            // prefix, exactly as the web client sent it.
            outbound = outbound.header(
                AUTHORIZATION,
                urlencoding::encode(&scope.session_token).into_owned(),
            );
        }

        let response = outbound.send().await.context(TransportSnafu {
            stage: "open-mentor-stream",
        })?;
        if let Some(error) = status_error(response.status()) {
            return Err(error);
        }
        Ok(response)
    }

    async fn run_stream_worker(
        client: reqwest::Client,
        config: BackendConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let target = request.target;
        let response = match Self::open_stream(&client, &config, &request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(target = ?target, error = %error, "failed to open mentor stream");
                Self::emit_error_event(&event_tx, target, error.user_message());
                return;
            }
        };

        let mut byte_stream = response.bytes_stream();
        let mut decoder = Utf8StreamDecoder::new();
        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    tracing::debug!(target = ?target, "mentor stream dropped before completion");
                    break;
                }
                next_chunk = byte_stream.next() => {
                    match next_chunk {
                        Some(Ok(chunk)) => {
                            let fragment = decoder.feed(&chunk);
                            if !fragment.is_empty()
                                && Self::emit_delta_event(&event_tx, target, fragment).is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            let error = ReadBodySnafu {
                                stage: "read-mentor-stream",
                            }
                            .into_error(source);
                            tracing::warn!(target = ?target, error = %error, "mentor stream read failed");
                            Self::emit_error_event(&event_tx, target, error.user_message());
                            break;
                        }
                        None => {
                            let tail = decoder.finish();
                            if !tail.is_empty()
                                && Self::emit_delta_event(&event_tx, target, tail).is_err()
                            {
                                return;
                            }
                            break;
                        }
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            let _ = event_tx.send(StreamEvent {
                target,
                payload: StreamEventPayload::Done,
            });
        }
    }

    fn emit_delta_event(
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        target: StreamTarget,
        fragment: String,
    ) -> Result<(), mpsc::error::SendError<StreamEvent>> {
        event_tx.send(StreamEvent {
            target,
            payload: StreamEventPayload::Delta(fragment),
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        target: StreamTarget,
        message: String,
    ) {
        let _ = event_tx.send(StreamEvent {
            target,
            payload: StreamEventPayload::Error(message),
        });
    }
}

impl MentorBackend for HttpBackend {
    fn name(&self) -> &str {
        "mentor-http"
    }

    fn stream_chat(&self, request: StreamRequest) -> BackendResult<BackendStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat"
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.target);
        let worker = Box::pin(Self::run_stream_worker(
            self.client.clone(),
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(BackendStreamHandle { stream, worker })
    }

    fn fetch_identity<'a>(
        &'a self,
        session_token: &'a str,
    ) -> BoxFuture<'a, Option<StudentIdentity>> {
        Box::pin(identity::fetch_identity(
            &self.client,
            &self.config,
            session_token,
        ))
    }
}

fn status_error(status: StatusCode) -> Option<BackendError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::UNAUTHORIZED {
        return Some(
            UnauthorizedSnafu {
                stage: "open-mentor-stream",
            }
            .build(),
        );
    }
    Some(
        UpstreamStatusSnafu {
            stage: "open-mentor-stream",
            status: status.as_u16(),
        }
        .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExerciseScope;

    fn test_config() -> BackendConfig {
        BackendConfig::new("https://api.test/v1", "https://auth.test/v1", "mentor/0.1")
    }

    #[test]
    fn request_body_includes_exercise_scope_fields() {
        let messages = vec![OutboundMessage::user("hi")];
        let body = ChatRequestBody {
            messages: &messages,
            exercise_id: Some("ex-204"),
            student_code: Some("fn main() {}"),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "exerciseId": "ex-204",
                "studentCode": "fn main() {}",
            })
        );
    }

    #[test]
    fn anonymous_body_carries_only_messages() {
        let messages = vec![OutboundMessage::user("hi")];
        let body = ChatRequestBody {
            messages: &messages,
            exercise_id: None,
            student_code: None,
        };

        let value = serde_json::to_value(&body).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(object.contains_key("messages"));
    }

    #[test]
    fn statuses_map_to_the_right_errors() {
        assert!(status_error(StatusCode::OK).is_none());

        let unauthorized = status_error(StatusCode::UNAUTHORIZED).unwrap();
        assert!(matches!(unauthorized, BackendError::Unauthorized { .. }));

        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE).unwrap();
        assert!(matches!(
            unavailable,
            BackendError::UpstreamStatus { status: 503, .. }
        ));
    }

    #[test]
    fn empty_message_set_is_rejected_before_any_request() {
        let backend = HttpBackend::new(test_config()).unwrap();
        let request = StreamRequest::new(crate::api::StreamTarget::new(1, 1), Vec::new());

        let error = backend.stream_chat(request).unwrap_err();
        assert!(matches!(error, BackendError::EmptyMessageSet { .. }));
    }

    #[test]
    fn exercise_scope_rides_along_unchanged() {
        let request = StreamRequest::new(
            crate::api::StreamTarget::new(1, 2),
            vec![OutboundMessage::user("hi")],
        )
        .with_exercise_scope(ExerciseScope {
            exercise_id: "ex-1".into(),
            student_code: "code".into(),
            session_token: "tok==".into(),
        });

        let scope = request.exercise_scope.unwrap();
        assert_eq!(scope.exercise_id, "ex-1");
        assert_eq!(urlencoding::encode(&scope.session_token), "tok%3D%3D");
    }
}
