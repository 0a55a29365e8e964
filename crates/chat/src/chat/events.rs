use super::message::{StreamTarget, StreamTransition};

/// Backend stream events mapped into conversation vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventMapped {
    pub target: StreamTarget,
    pub payload: StreamEventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    /// Text fragment to append to the trailing assistant message.
    Delta(String),
    Done,
    /// Terminal failure carrying the user-visible message.
    Error(String),
}

impl StreamEventMapped {
    pub fn delta(target: StreamTarget, fragment: impl Into<String>) -> Self {
        Self {
            target,
            payload: StreamEventPayload::Delta(fragment.into()),
        }
    }

    pub fn done(target: StreamTarget) -> Self {
        Self {
            target,
            payload: StreamEventPayload::Done,
        }
    }

    pub fn error(target: StreamTarget, message: impl Into<String>) -> Self {
        Self {
            target,
            payload: StreamEventPayload::Error(message.into()),
        }
    }

    /// Transition this event implies for the stream state machine, if any.
    pub fn into_transition(self) -> Option<StreamTransition> {
        match self.payload {
            StreamEventPayload::Delta(_) => None,
            StreamEventPayload::Done => Some(StreamTransition::Complete(self.target)),
            StreamEventPayload::Error(message) => Some(StreamTransition::Fail {
                target: self.target,
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::{ConversationId, StreamSessionId};

    fn target() -> StreamTarget {
        StreamTarget::new(ConversationId::new(1), StreamSessionId::new(1))
    }

    #[test]
    fn deltas_imply_no_transition() {
        assert_eq!(StreamEventMapped::delta(target(), "hi").into_transition(), None);
    }

    #[test]
    fn done_implies_complete() {
        assert_eq!(
            StreamEventMapped::done(target()).into_transition(),
            Some(StreamTransition::Complete(target()))
        );
    }

    #[test]
    fn error_implies_fail_with_message() {
        assert_eq!(
            StreamEventMapped::error(target(), "boom").into_transition(),
            Some(StreamTransition::Fail {
                target: target(),
                message: "boom".into(),
            })
        );
    }
}
