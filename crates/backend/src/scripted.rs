//! Backend that replays a fixed script instead of calling the network.
//! Used by unit tests and the QA runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use snafu::ensure;

use crate::api::{
    BackendResult, BackendStreamHandle, BoxFuture, EmptyMessageSetSnafu, MentorBackend,
    StreamEvent, StreamEventPayload, StreamRequest, make_event_stream,
};
use crate::identity::StudentIdentity;

/// How a scripted exchange ends after its fragments are replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEnding {
    /// Clean completion.
    Done,
    /// Failure carrying the user-visible message.
    Error(String),
    /// The stream closes with no terminal event at all, as when the
    /// connection drops mid-reply.
    Vanish,
}

pub struct ScriptedBackend {
    fragments: Vec<String>,
    ending: ScriptedEnding,
    identity: Option<StudentIdentity>,
    stream_calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn streaming(fragments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: ScriptedEnding::Done,
            identity: None,
            stream_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replays `fragments`, then fails with `message` instead of finishing
    /// cleanly.
    pub fn failing_after(
        fragments: impl IntoIterator<Item = impl Into<String>>,
        message: impl Into<String>,
    ) -> Self {
        let mut backend = Self::streaming(fragments);
        backend.ending = ScriptedEnding::Error(message.into());
        backend
    }

    /// Fails immediately, as when the endpoint refuses the request before
    /// any bytes arrive.
    pub fn refusing(message: impl Into<String>) -> Self {
        Self::failing_after(Vec::<String>::new(), message)
    }

    /// Replays `fragments`, then closes the stream without a terminal event.
    pub fn vanishing(fragments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut backend = Self::streaming(fragments);
        backend.ending = ScriptedEnding::Vanish;
        backend
    }

    pub fn with_identity(mut self, identity: StudentIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Number of exchanges started against this backend.
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

impl MentorBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "mentor-scripted"
    }

    fn stream_chat(&self, request: StreamRequest) -> BackendResult<BackendStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat"
            }
        );
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        let target = request.target;
        let fragments = self.fragments.clone();
        let ending = self.ending.clone();
        let (event_tx, stream, cancel_rx) = make_event_stream(target);

        let worker = Box::pin(async move {
            // Scripted replays are short; cancellation is not observed
            // mid-script.
            let _cancel_rx = cancel_rx;
            for fragment in fragments {
                let event = StreamEvent {
                    target,
                    payload: StreamEventPayload::Delta(fragment),
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
            match ending {
                ScriptedEnding::Done => {
                    let _ = event_tx.send(StreamEvent {
                        target,
                        payload: StreamEventPayload::Done,
                    });
                }
                ScriptedEnding::Error(message) => {
                    let _ = event_tx.send(StreamEvent {
                        target,
                        payload: StreamEventPayload::Error(message),
                    });
                }
                ScriptedEnding::Vanish => {}
            }
        });

        Ok(BackendStreamHandle { stream, worker })
    }

    fn fetch_identity<'a>(
        &'a self,
        session_token: &'a str,
    ) -> BoxFuture<'a, Option<StudentIdentity>> {
        let identity = if session_token.trim().is_empty() {
            None
        } else {
            self.identity.clone()
        };
        Box::pin(async move { identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{OutboundMessage, StreamTarget};

    fn request() -> StreamRequest {
        StreamRequest::new(StreamTarget::new(1, 1), vec![OutboundMessage::user("hi")])
    }

    fn drain(stream: &mut crate::api::BackendEventStream) -> Vec<StreamEventPayload> {
        let mut payloads = Vec::new();
        while let Ok(event) = stream.try_recv() {
            payloads.push(event.payload);
        }
        payloads
    }

    #[tokio::test]
    async fn replays_fragments_in_order_then_done() {
        let backend = ScriptedBackend::streaming(["Hel", "lo"]);
        let BackendStreamHandle { mut stream, worker } = backend.stream_chat(request()).unwrap();
        worker.await;

        assert_eq!(
            drain(&mut stream),
            vec![
                StreamEventPayload::Delta("Hel".into()),
                StreamEventPayload::Delta("lo".into()),
                StreamEventPayload::Done,
            ]
        );
        assert_eq!(backend.stream_calls(), 1);
    }

    #[tokio::test]
    async fn failing_script_ends_with_error_event() {
        let backend = ScriptedBackend::failing_after(["partial"], "boom");
        let BackendStreamHandle { mut stream, worker } = backend.stream_chat(request()).unwrap();
        worker.await;

        let payloads = drain(&mut stream);
        assert_eq!(
            payloads.last(),
            Some(&StreamEventPayload::Error("boom".into()))
        );
    }

    #[tokio::test]
    async fn vanishing_script_closes_without_terminal_event() {
        let backend = ScriptedBackend::vanishing(["partial"]);
        let BackendStreamHandle { mut stream, worker } = backend.stream_chat(request()).unwrap();
        worker.await;

        assert_eq!(
            drain(&mut stream),
            vec![StreamEventPayload::Delta("partial".into())]
        );
    }

    #[tokio::test]
    async fn identity_requires_a_session_token() {
        let identity = StudentIdentity {
            email: "s@example.com".into(),
            first_name: None,
            last_name: None,
        };
        let backend = ScriptedBackend::streaming(["x"]).with_identity(identity.clone());

        assert_eq!(backend.fetch_identity("tok").await, Some(identity));
        assert_eq!(backend.fetch_identity("  ").await, None);
    }
}
