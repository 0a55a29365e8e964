use std::fmt;

/// Upper bound on user messages per conversation.
pub const USER_MESSAGE_LIMIT: usize = 5;

/// Assistant greeting seeded into every fresh conversation.
pub const MENTOR_GREETING: &str = "## Hey there 👋\nI'm your AI mentor. How can I help you?\n\nYou don't need to copy/paste your exercise requirements or code here. I'm already aware of what you are working on. Feel free to start conversation straight away.";

/// Conversation identity used to correlate streaming events with popup
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub u64);

impl ConversationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Monotonic id minted per streamed exchange. A new submission mints a new
/// session, which is how events from a superseded exchange get recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamSessionId(pub u64);

impl StreamSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamSessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identity of one streamed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub conversation_id: ConversationId,
    pub session_id: StreamSessionId,
}

impl StreamTarget {
    pub const fn new(conversation_id: ConversationId, session_id: StreamSessionId) -> Self {
        Self {
            conversation_id,
            session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    /// Being filled by the active stream.
    Streaming(StreamSessionId),
    Done,
    /// Failed; the payload is the user-visible message.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
}

impl Message {
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Done,
        }
    }

    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Done,
        }
    }

    /// Empty assistant placeholder the active stream appends into.
    pub fn assistant_streaming(id: MessageId, session_id: StreamSessionId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Streaming(session_id),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.status, MessageStatus::Streaming(_))
    }
}

/// Stream lifecycle for one conversation. At most one stream is active at a
/// time; a new exchange must wait for the previous terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamTarget),
    Done(StreamTarget),
    Error {
        target: StreamTarget,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyStreaming {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveStream {
        attempted: StreamTarget,
    },
    SessionMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(target) => self.apply_start(target),
            StreamTransition::Complete(target) => self.apply_complete(target),
            StreamTransition::Fail { target, message } => self.apply_fail(target, message),
        }
    }

    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Streaming(target) => Some(*target),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// True when an event for `target` should still be applied.
    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        self.active_target() == Some(target)
    }

    fn apply_start(&self, target: StreamTarget) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) => Err(StreamTransitionRejection::AlreadyStreaming {
                active: *active,
                attempted: target,
            }),
            _ => Ok(Self::Streaming(target)),
        }
    }

    fn apply_complete(&self, target: StreamTarget) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Done(target)),
            Self::Streaming(active) => Err(StreamTransitionRejection::SessionMismatch {
                active: *active,
                attempted: target,
            }),
            _ => Err(StreamTransitionRejection::NoActiveStream { attempted: target }),
        }
    }

    fn apply_fail(&self, target: StreamTarget, message: String) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Error { target, message }),
            Self::Streaming(active) => Err(StreamTransitionRejection::SessionMismatch {
                active: *active,
                attempted: target,
            }),
            _ => Err(StreamTransitionRejection::NoActiveStream { attempted: target }),
        }
    }
}

/// One in-memory conversation. Nothing is persisted; closing the popup
/// discards it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub messages: Vec<Message>,
    pub stream_state: StreamState,
}

impl Conversation {
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            stream_state: StreamState::Idle,
        }
    }

    /// Fresh conversation opening with the mentor greeting.
    pub fn with_greeting(id: ConversationId, greeting_id: MessageId) -> Self {
        let mut conversation = Self::new(id);
        conversation
            .messages
            .push(Message::assistant(greeting_id, MENTOR_GREETING));
        conversation
    }

    /// User messages sent so far. The seeded greeting is an assistant
    /// message and never counts toward the limit.
    pub fn user_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
    }

    pub fn user_limit_reached(&self) -> bool {
        self.user_message_count() >= USER_MESSAGE_LIMIT
    }

    pub fn apply_stream_transition(
        &mut self,
        transition: StreamTransition,
    ) -> StreamTransitionResult {
        let next = self.stream_state.apply(transition)?;
        self.stream_state = next.clone();
        Ok(next)
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_state.is_streaming()
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
