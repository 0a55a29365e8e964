/// Composer draft and submission gating.
pub mod composer;
/// Event contracts for stream wiring.
pub mod events;
/// Domain entities and deterministic stream state boundaries.
pub mod message;
pub mod popup;
pub mod scroll;

pub use composer::Composer;
pub use events::{StreamEventMapped, StreamEventPayload};
pub use message::{
    Conversation, ConversationId, MENTOR_GREETING, Message, MessageId, MessageStatus, Role,
    StreamSessionId, StreamState, StreamTarget, StreamTransition, StreamTransitionRejection,
    StreamTransitionResult, USER_MESSAGE_LIMIT,
};
pub use popup::{
    ContextMode, DisplayMode, FIXED_POPUP_WIDTH, MentorPopup, PopupOptions,
};
pub use scroll::{NEAR_BOTTOM_THRESHOLD, ScrollMonitor, ViewportMetrics};
