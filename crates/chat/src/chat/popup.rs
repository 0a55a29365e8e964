//! Headless mentor popup: the conversation surface embedders drive.
//!
//! Owns one in-memory conversation, the composer, scroll tracking, and the
//! copy affordance, and runs the submit pipeline against an injected
//! backend. Surfaces render from this state after every call; there is no
//! hidden channel between the popup and its embedder.

use std::sync::Arc;
use std::time::Instant;

use mentor_backend::{
    BackendStreamHandle, ExerciseScope, GENERIC_ERROR_TEXT, MentorBackend, OutboundMessage,
    StreamRequest,
};
use mentor_render::{Clipboard, CopyIndicator, CopyResult, MessageDocument};
use mentor_store::{ExerciseContext, LocalStore, SessionVault};

use super::composer::Composer;
use super::events::{StreamEventMapped, StreamEventPayload};
use super::message::{
    Conversation, ConversationId, Message, MessageId, MessageStatus, Role, StreamSessionId,
    StreamTarget, StreamTransition,
};
use super::scroll::{ScrollMonitor, ViewportMetrics};

/// Width of the docked popup, in pixels.
pub const FIXED_POPUP_WIDTH: f32 = 550.0;

/// Where the popup runs and how submissions are scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// Landing placement: conversation history only, no exercise payload.
    #[default]
    Anonymous,
    /// Signed-in exercise placement: submissions carry the exercise context
    /// and the session token.
    ExerciseSession,
}

/// How the popup is framed by its host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Docked at a fixed width.
    #[default]
    Fixed,
    /// Docked, with a full-screen toggle.
    FullScreenCapable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupOptions {
    pub context_mode: ContextMode,
    pub display_mode: DisplayMode,
    /// Whether the jump-to-latest affordance is rendered at all.
    pub scroll_affordance: bool,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            context_mode: ContextMode::Anonymous,
            display_mode: DisplayMode::Fixed,
            scroll_affordance: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveStream {
    target: StreamTarget,
    assistant_message_id: MessageId,
}

pub struct MentorPopup {
    options: PopupOptions,
    backend: Arc<dyn MentorBackend>,
    local_store: Arc<dyn LocalStore>,
    session_vault: Arc<dyn SessionVault>,
    conversation: Conversation,
    composer: Composer,
    scroll: ScrollMonitor,
    copy_indicator: CopyIndicator,
    copied_message: Option<MessageId>,
    active_stream: Option<ActiveStream>,
    last_error: Option<String>,
    is_open: bool,
    is_full_screen: bool,
    next_message_id: u64,
    next_stream_session: u64,
}

impl MentorPopup {
    pub fn new(
        options: PopupOptions,
        backend: Arc<dyn MentorBackend>,
        local_store: Arc<dyn LocalStore>,
        session_vault: Arc<dyn SessionVault>,
    ) -> Self {
        let mut popup = Self {
            options,
            backend,
            local_store,
            session_vault,
            conversation: Conversation::new(ConversationId::new(1)),
            composer: Composer::new(),
            scroll: ScrollMonitor::new(),
            copy_indicator: CopyIndicator::new(),
            copied_message: None,
            active_stream: None,
            last_error: None,
            is_open: false,
            is_full_screen: false,
            next_message_id: 1,
            next_stream_session: 1,
        };
        popup.reset_conversation();
        popup
    }

    /// Resolves which placement the popup should run as: a resolvable
    /// identity selects the exercise placement, anything else stays
    /// anonymous.
    pub async fn detect_context_mode(
        backend: &dyn MentorBackend,
        session_vault: &dyn SessionVault,
    ) -> ContextMode {
        let Some(token) = session_vault.session_token() else {
            return ContextMode::Anonymous;
        };
        match backend.fetch_identity(token.as_str()).await {
            Some(identity) => {
                tracing::debug!(email = %identity.email, "student signed in");
                ContextMode::ExerciseSession
            }
            None => ContextMode::Anonymous,
        }
    }

    pub fn options(&self) -> PopupOptions {
        self.options
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.conversation.is_streaming()
    }

    pub fn draft(&self) -> &str {
        self.composer.draft()
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.composer.set_draft(draft);
    }

    /// Mirrors the send button state.
    pub fn submit_disabled(&self) -> bool {
        !self
            .composer
            .can_submit(self.conversation.user_message_count())
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn open(&mut self) {
        self.is_open = true;
    }

    /// Closing discards the conversation; reopening starts fresh.
    pub fn close(&mut self) {
        self.is_open = false;
        self.is_full_screen = false;
        self.reset_conversation();
    }

    pub fn toggle_open(&mut self) {
        if self.is_open {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn is_full_screen(&self) -> bool {
        self.is_full_screen
    }

    /// Full-screen toggle; ignored when the host frame is fixed-width.
    pub fn toggle_full_screen(&mut self) {
        if self.options.display_mode == DisplayMode::FullScreenCapable {
            self.is_full_screen = !self.is_full_screen;
        }
    }

    pub fn observe_scroll(&mut self, metrics: ViewportMetrics) {
        self.scroll.observe_scroll(metrics);
    }

    /// Jump-to-latest affordance press.
    pub fn jump_to_latest(&mut self) {
        self.scroll.request_scroll_to_bottom();
    }

    pub fn apply_pending_scroll(&mut self) -> bool {
        self.scroll.apply_pending_scroll()
    }

    pub fn scroll(&self) -> &ScrollMonitor {
        &self.scroll
    }

    pub fn show_scroll_affordance(&self) -> bool {
        self.options.scroll_affordance && self.scroll.user_is_scrolling()
    }

    /// Runs one full exchange: submission gates, the streamed reply, and
    /// the terminal state. Returns once the conversation has settled.
    pub async fn submit(&mut self) {
        let Some(request) = self.begin_exchange() else {
            return;
        };
        let chat_target = Self::from_backend_target(request.target);

        let handle = match self.backend.stream_chat(request) {
            Ok(handle) => handle,
            Err(error) => {
                tracing::error!(error = %error, "failed to start mentor stream");
                self.handle_stream_event(StreamEventMapped::error(
                    chat_target,
                    error.user_message(),
                ));
                return;
            }
        };

        self.drive_stream(handle).await;
    }

    /// Synchronous phase of a submission: gates, conversation mutations,
    /// and the outbound request. Returns `None` when the submission is a
    /// no-op (blank draft, active stream, reached cap, or missing local
    /// state on the authenticated path); the draft stays put in that case.
    pub fn begin_exchange(&mut self) -> Option<StreamRequest> {
        let user_message_count = self.conversation.user_message_count();
        if !self.composer.can_submit(user_message_count) {
            return None;
        }

        let exercise_scope = match self.options.context_mode {
            ContextMode::Anonymous => None,
            ContextMode::ExerciseSession => match self.load_exercise_scope() {
                Some(scope) => Some(scope),
                None => return None,
            },
        };

        let content = self.composer.take_submission(user_message_count)?;

        let target = StreamTarget::new(
            self.conversation.id,
            StreamSessionId::new(self.next_stream_session),
        );
        if let Err(rejection) = self
            .conversation
            .apply_stream_transition(StreamTransition::Start(target))
        {
            tracing::warn!(rejection = ?rejection, "stream start rejected");
            self.composer.set_draft(content);
            return None;
        }
        self.next_stream_session += 1;
        self.last_error = None;

        let user_id = self.alloc_message_id();
        self.conversation
            .messages
            .push(Message::user(user_id, content));

        let outbound = self.outbound_history();

        let assistant_id = self.alloc_message_id();
        self.conversation
            .messages
            .push(Message::assistant_streaming(assistant_id, target.session_id));

        self.active_stream = Some(ActiveStream {
            target,
            assistant_message_id: assistant_id,
        });
        self.composer.set_streaming(true);
        self.scroll.content_updated();

        let mut request = StreamRequest::new(Self::to_backend_target(target), outbound);
        if let Some(scope) = exercise_scope {
            request = request.with_exercise_scope(scope);
        }
        Some(request)
    }

    /// Pumps one stream to completion, applying events as they arrive. The
    /// worker and the consumer are polled in the same task.
    pub async fn drive_stream(&mut self, handle: BackendStreamHandle) {
        let BackendStreamHandle { mut stream, worker } = handle;
        let chat_target = Self::from_backend_target(stream.target());

        let consume = async {
            while let Some(event) = stream.recv().await {
                self.handle_stream_event(Self::map_backend_event(event));
            }
        };
        tokio::join!(worker, consume);

        // A stream that closed with no terminal event still has to settle
        // the conversation.
        if self
            .conversation
            .stream_state
            .accepts_stream_event(chat_target)
        {
            tracing::warn!(target = ?chat_target, "mentor stream closed before a terminal event");
            self.handle_stream_event(StreamEventMapped::error(chat_target, GENERIC_ERROR_TEXT));
        }
    }

    /// Applies one mapped stream event. Events for anything other than the
    /// active stream are dropped.
    pub fn handle_stream_event(&mut self, event: StreamEventMapped) {
        if !self.stream_event_is_current(event.target) {
            tracing::debug!(target = ?event.target, "dropping stale stream event");
            return;
        }

        match event.payload {
            StreamEventPayload::Delta(fragment) => self.append_stream_fragment(&fragment),
            StreamEventPayload::Done => self.finalize_stream(
                MessageStatus::Done,
                StreamTransition::Complete(event.target),
            ),
            StreamEventPayload::Error(message) => {
                self.last_error = Some(message.clone());
                self.finalize_stream(
                    MessageStatus::Error(message.clone()),
                    StreamTransition::Fail {
                        target: event.target,
                        message,
                    },
                );
            }
        }
    }

    /// Document for one message body, reparsed from its current content.
    pub fn document_for(&self, message_id: MessageId) -> Option<MessageDocument> {
        let message = self
            .conversation
            .messages
            .iter()
            .find(|message| message.id == message_id)?;
        Some(MessageDocument::parse(&message.content))
    }

    /// Copies one code block out of `message_id` and arms the copied
    /// indicator for it. Returns false when there is no such block.
    pub fn copy_code_block(
        &mut self,
        clipboard: &mut dyn Clipboard,
        message_id: MessageId,
        block_index: usize,
        now: Instant,
    ) -> CopyResult<bool> {
        let Some(document) = self.document_for(message_id) else {
            return Ok(false);
        };
        let Some(code) = document.code_block_text(block_index) else {
            return Ok(false);
        };
        self.copy_indicator
            .copy_block(clipboard, block_index, code, now)?;
        self.copied_message = Some(message_id);
        Ok(true)
    }

    /// Block of `message_id` currently showing the copied state, if any.
    pub fn copied_block(&self, message_id: MessageId) -> Option<usize> {
        if self.copied_message == Some(message_id) {
            self.copy_indicator.copied_block()
        } else {
            None
        }
    }

    /// Periodic tick reverting the copied indicator. Returns true when a
    /// redraw is due.
    pub fn tick(&mut self, now: Instant) -> bool {
        let reverted = self.copy_indicator.tick(now);
        if reverted {
            self.copied_message = None;
        }
        reverted
    }

    fn reset_conversation(&mut self) {
        let greeting_id = self.alloc_message_id();
        self.conversation = Conversation::with_greeting(self.conversation.id, greeting_id);
        self.composer = Composer::new();
        self.scroll.reset();
        self.copy_indicator = CopyIndicator::new();
        self.copied_message = None;
        self.active_stream = None;
        self.last_error = None;
    }

    fn load_exercise_scope(&self) -> Option<ExerciseScope> {
        let context = match ExerciseContext::load(self.local_store.as_ref()) {
            Some(context) => context,
            None => {
                tracing::debug!("exercise context missing, dropping submission");
                return None;
            }
        };
        let token = match self.session_vault.session_token() {
            Some(token) => token,
            None => {
                tracing::debug!("session token missing, dropping submission");
                return None;
            }
        };
        Some(ExerciseScope {
            exercise_id: context.exercise_id,
            student_code: context.student_code,
            session_token: token.as_str().to_string(),
        })
    }

    /// History for the outbound request: everything visible except the
    /// placeholder the reply streams into.
    fn outbound_history(&self) -> Vec<OutboundMessage> {
        self.conversation
            .messages
            .iter()
            .filter(|message| !message.is_streaming())
            .map(|message| match message.role {
                Role::User => OutboundMessage::user(message.content.clone()),
                Role::Assistant => OutboundMessage::assistant(message.content.clone()),
            })
            .collect()
    }

    fn stream_event_is_current(&self, target: StreamTarget) -> bool {
        self.conversation.stream_state.accepts_stream_event(target)
            && self
                .active_stream
                .map(|active| active.target == target)
                .unwrap_or(false)
    }

    fn append_stream_fragment(&mut self, fragment: &str) {
        let Some(active) = self.active_stream else {
            return;
        };
        if let Some(message) = self.conversation.message_mut(active.assistant_message_id) {
            message.content.push_str(fragment);
        }
        self.scroll.content_updated();
    }

    fn finalize_stream(&mut self, final_status: MessageStatus, transition: StreamTransition) {
        if let Err(rejection) = self.conversation.apply_stream_transition(transition) {
            tracing::warn!(rejection = ?rejection, "stream finalize rejected");
        }

        if let Some(active) = self.active_stream.take() {
            if let Some(message) = self.conversation.message_mut(active.assistant_message_id) {
                if let MessageStatus::Error(text) = &final_status {
                    message.content = text.clone();
                }
                message.status = final_status;
            }
        }
        self.composer.set_streaming(false);
        self.scroll.content_updated();
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    fn to_backend_target(target: StreamTarget) -> mentor_backend::StreamTarget {
        mentor_backend::StreamTarget::new(target.conversation_id.raw(), target.session_id.raw())
    }

    fn from_backend_target(target: mentor_backend::StreamTarget) -> StreamTarget {
        StreamTarget::new(
            ConversationId::new(target.conversation_id),
            StreamSessionId::new(target.session_id),
        )
    }

    fn map_backend_event(event: mentor_backend::StreamEvent) -> StreamEventMapped {
        let target = Self::from_backend_target(event.target);
        match event.payload {
            mentor_backend::StreamEventPayload::Delta(fragment) => {
                StreamEventMapped::delta(target, fragment)
            }
            mentor_backend::StreamEventPayload::Done => StreamEventMapped::done(target),
            mentor_backend::StreamEventPayload::Error(message) => {
                StreamEventMapped::error(target, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::MENTOR_GREETING;
    use mentor_backend::{ScriptedBackend, StudentIdentity, UNAUTHORIZED_ERROR_TEXT};
    use mentor_render::MemoryClipboard;
    use mentor_store::{MemoryStore, MemoryVault};
    use std::time::Duration;

    fn popup_with(
        options: PopupOptions,
        backend: ScriptedBackend,
        store: MemoryStore,
        vault: MemoryVault,
    ) -> (MentorPopup, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let popup = MentorPopup::new(options, backend.clone(), Arc::new(store), Arc::new(vault));
        (popup, backend)
    }

    fn anonymous_popup(backend: ScriptedBackend) -> (MentorPopup, Arc<ScriptedBackend>) {
        popup_with(
            PopupOptions::default(),
            backend,
            MemoryStore::new(),
            MemoryVault::new(),
        )
    }

    #[test]
    fn fresh_popup_opens_with_the_greeting() {
        let (popup, _) = anonymous_popup(ScriptedBackend::streaming(["x"]));

        assert_eq!(popup.messages().len(), 1);
        assert_eq!(popup.messages()[0].role, Role::Assistant);
        assert_eq!(popup.messages()[0].content, MENTOR_GREETING);
        assert_eq!(popup.conversation().user_message_count(), 0);
    }

    #[tokio::test]
    async fn submit_streams_fragments_into_one_assistant_message() {
        let (mut popup, backend) =
            anonymous_popup(ScriptedBackend::streaming(["Hello", " wor", "ld"]));

        popup.set_draft("hi");
        popup.submit().await;

        let messages = popup.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "Hello world");
        assert_eq!(messages[2].status, MessageStatus::Done);
        assert!(!popup.is_streaming());
        assert_eq!(popup.last_error(), None);
        assert_eq!(backend.stream_calls(), 1);
    }

    #[tokio::test]
    async fn deltas_grow_the_trailing_message_without_adding_rows() {
        let (mut popup, backend) = anonymous_popup(ScriptedBackend::streaming(["unused"]));

        popup.set_draft("hi");
        let request = popup.begin_exchange().unwrap();
        let target = MentorPopup::from_backend_target(request.target);
        assert_eq!(popup.messages().len(), 3);

        popup.handle_stream_event(StreamEventMapped::delta(target, "Step "));
        popup.handle_stream_event(StreamEventMapped::delta(target, "one"));
        assert_eq!(popup.messages().len(), 3);
        assert_eq!(popup.messages()[2].content, "Step one");
        assert!(popup.is_streaming());

        popup.handle_stream_event(StreamEventMapped::done(target));
        assert_eq!(popup.messages()[2].status, MessageStatus::Done);
        assert!(!popup.is_streaming());
        assert_eq!(backend.stream_calls(), 0);
    }

    #[tokio::test]
    async fn events_for_a_superseded_session_are_dropped() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["x"]));

        popup.set_draft("hi");
        let request = popup.begin_exchange().unwrap();
        let live = MentorPopup::from_backend_target(request.target);
        let stale = StreamTarget::new(live.conversation_id, StreamSessionId::new(999));

        popup.handle_stream_event(StreamEventMapped::delta(stale, "zzz"));
        assert_eq!(popup.messages()[2].content, "");

        popup.handle_stream_event(StreamEventMapped::error(stale, "boom"));
        assert!(popup.is_streaming());
        assert_eq!(popup.last_error(), None);

        popup.handle_stream_event(StreamEventMapped::done(live));
        assert!(!popup.is_streaming());
    }

    #[tokio::test]
    async fn blank_draft_submission_is_a_no_op() {
        let (mut popup, backend) = anonymous_popup(ScriptedBackend::streaming(["x"]));

        popup.set_draft("   ");
        popup.submit().await;

        assert_eq!(popup.messages().len(), 1);
        assert_eq!(backend.stream_calls(), 0);
        assert_eq!(popup.draft(), "   ");
    }

    #[tokio::test]
    async fn sixth_user_message_is_refused() {
        let (mut popup, backend) = anonymous_popup(ScriptedBackend::streaming(["ok"]));

        for turn in 0..5 {
            popup.set_draft(format!("question {turn}"));
            popup.submit().await;
        }
        assert_eq!(popup.conversation().user_message_count(), 5);
        assert_eq!(backend.stream_calls(), 5);

        popup.set_draft("one more");
        assert!(popup.submit_disabled());
        popup.submit().await;

        assert_eq!(popup.conversation().user_message_count(), 5);
        assert_eq!(backend.stream_calls(), 5);
        assert_eq!(popup.draft(), "one more");
    }

    #[tokio::test]
    async fn failure_replaces_the_reply_and_sets_last_error() {
        let refusal = format!("{GENERIC_ERROR_TEXT} (HTTP 503)");
        let (mut popup, backend) =
            anonymous_popup(ScriptedBackend::failing_after(["partial"], refusal.clone()));

        popup.set_draft("hi");
        popup.submit().await;

        let trailing = popup.messages().last().unwrap();
        assert_eq!(trailing.content, refusal);
        assert_eq!(trailing.status, MessageStatus::Error(refusal.clone()));
        assert_eq!(popup.last_error(), Some(refusal.as_str()));
        assert!(!popup.is_streaming());

        // The conversation stays usable afterwards.
        popup.set_draft("retry");
        popup.submit().await;
        assert_eq!(backend.stream_calls(), 2);
        assert_eq!(popup.last_error(), Some(refusal.as_str()));
    }

    #[tokio::test]
    async fn unauthorized_failure_keeps_its_distinct_text() {
        let (mut popup, _) =
            anonymous_popup(ScriptedBackend::refusing(UNAUTHORIZED_ERROR_TEXT));

        popup.set_draft("hi");
        popup.submit().await;

        assert_eq!(popup.last_error(), Some(UNAUTHORIZED_ERROR_TEXT));
    }

    #[tokio::test]
    async fn a_new_submission_clears_last_error() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::refusing("boom"));
        popup.set_draft("hi");
        popup.submit().await;
        assert_eq!(popup.last_error(), Some("boom"));

        popup.set_draft("again");
        let request = popup.begin_exchange().unwrap();
        assert_eq!(popup.last_error(), None);

        let target = MentorPopup::from_backend_target(request.target);
        popup.handle_stream_event(StreamEventMapped::done(target));
        assert!(!popup.is_streaming());
    }

    #[tokio::test]
    async fn vanished_stream_settles_as_a_failure() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::vanishing(["part"]));

        popup.set_draft("hi");
        popup.submit().await;

        let trailing = popup.messages().last().unwrap();
        assert_eq!(trailing.status, MessageStatus::Error(GENERIC_ERROR_TEXT.into()));
        assert_eq!(popup.last_error(), Some(GENERIC_ERROR_TEXT));
        assert!(!popup.is_streaming());
    }

    #[tokio::test]
    async fn missing_exercise_context_aborts_silently() {
        let options = PopupOptions {
            context_mode: ContextMode::ExerciseSession,
            ..PopupOptions::default()
        };
        let (mut popup, backend) = popup_with(
            options,
            ScriptedBackend::streaming(["x"]),
            MemoryStore::new(),
            MemoryVault::with_session("tok"),
        );

        popup.set_draft("hi");
        popup.submit().await;

        assert_eq!(popup.messages().len(), 1);
        assert_eq!(backend.stream_calls(), 0);
        assert_eq!(popup.last_error(), None);
        assert_eq!(popup.draft(), "hi");
    }

    #[test]
    fn exercise_scope_rides_with_the_request() {
        let options = PopupOptions {
            context_mode: ContextMode::ExerciseSession,
            ..PopupOptions::default()
        };
        let (mut popup, _) = popup_with(
            options,
            ScriptedBackend::streaming(["x"]),
            MemoryStore::with_exercise_context("ex-204", "fn main() {}"),
            MemoryVault::with_session("tok=="),
        );

        popup.set_draft("hi");
        let request = popup.begin_exchange().unwrap();
        let scope = request.exercise_scope.unwrap();

        assert_eq!(scope.exercise_id, "ex-204");
        assert_eq!(scope.student_code, "fn main() {}");
        assert_eq!(scope.session_token, "tok==");
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn outbound_history_carries_greeting_and_turns() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["x"]));

        popup.set_draft("hi");
        let request = popup.begin_exchange().unwrap();

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, MENTOR_GREETING);
        assert_eq!(request.messages[1].content, "hi");
        assert!(request.exercise_scope.is_none());
    }

    #[tokio::test]
    async fn closing_discards_the_conversation() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["reply"]));

        popup.open();
        popup.set_draft("hi");
        popup.submit().await;
        assert_eq!(popup.messages().len(), 3);

        popup.close();
        assert!(!popup.is_open());
        assert_eq!(popup.messages().len(), 1);
        assert_eq!(popup.messages()[0].content, MENTOR_GREETING);
        assert_eq!(popup.conversation().user_message_count(), 0);
    }

    #[test]
    fn full_screen_only_toggles_when_capable() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["x"]));
        popup.toggle_full_screen();
        assert!(!popup.is_full_screen());

        let options = PopupOptions {
            display_mode: DisplayMode::FullScreenCapable,
            ..PopupOptions::default()
        };
        let (mut popup, _) = popup_with(
            options,
            ScriptedBackend::streaming(["x"]),
            MemoryStore::new(),
            MemoryVault::new(),
        );
        popup.toggle_full_screen();
        assert!(popup.is_full_screen());
        popup.toggle_full_screen();
        assert!(!popup.is_full_screen());
    }

    #[test]
    fn affordance_visibility_follows_options_and_scroll_state() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["x"]));
        assert!(!popup.show_scroll_affordance());

        popup.observe_scroll(ViewportMetrics::new(0.0, 100.0, 400.0));
        assert!(popup.show_scroll_affordance());

        popup.jump_to_latest();
        assert!(!popup.show_scroll_affordance());
        assert!(popup.apply_pending_scroll());

        let options = PopupOptions {
            scroll_affordance: false,
            ..PopupOptions::default()
        };
        let (mut popup, _) = popup_with(
            options,
            ScriptedBackend::streaming(["x"]),
            MemoryStore::new(),
            MemoryVault::new(),
        );
        popup.observe_scroll(ViewportMetrics::new(0.0, 100.0, 400.0));
        assert!(!popup.show_scroll_affordance());
    }

    #[tokio::test]
    async fn copying_a_code_block_arms_and_reverts_the_indicator() {
        let reply = ["Try this:\n", "```rust\n", "let x = 1;\n", "```"];
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(reply));

        popup.set_draft("how?");
        popup.submit().await;

        let message_id = popup.messages().last().unwrap().id;
        let document = popup.document_for(message_id).unwrap();
        let (block_index, _) = document.code_blocks().next().unwrap();

        let mut clipboard = MemoryClipboard::new();
        let start = Instant::now();
        let copied = popup
            .copy_code_block(&mut clipboard, message_id, block_index, start)
            .unwrap();

        assert!(copied);
        assert_eq!(clipboard.contents.as_deref(), Some("let x = 1;"));
        assert_eq!(popup.copied_block(message_id), Some(block_index));
        assert_eq!(popup.copied_block(popup.messages()[0].id), None);

        assert!(!popup.tick(start + Duration::from_millis(1999)));
        assert_eq!(popup.copied_block(message_id), Some(block_index));

        assert!(popup.tick(start + Duration::from_millis(2000)));
        assert_eq!(popup.copied_block(message_id), None);
    }

    #[tokio::test]
    async fn copy_reports_false_for_non_code_blocks() {
        let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["plain prose"]));
        popup.set_draft("hi");
        popup.submit().await;

        let message_id = popup.messages().last().unwrap().id;
        let mut clipboard = MemoryClipboard::new();
        let copied = popup
            .copy_code_block(&mut clipboard, message_id, 0, Instant::now())
            .unwrap();

        assert!(!copied);
        assert_eq!(clipboard.contents, None);
    }

    #[tokio::test]
    async fn context_mode_detection_follows_identity() {
        let identity = StudentIdentity {
            email: "s@example.com".into(),
            first_name: None,
            last_name: None,
        };
        let backend = ScriptedBackend::streaming(["x"]).with_identity(identity);

        let signed_in = MentorPopup::detect_context_mode(
            &backend,
            &MemoryVault::with_session("tok"),
        )
        .await;
        assert_eq!(signed_in, ContextMode::ExerciseSession);

        let no_session =
            MentorPopup::detect_context_mode(&backend, &MemoryVault::new()).await;
        assert_eq!(no_session, ContextMode::Anonymous);

        let unknown = MentorPopup::detect_context_mode(
            &ScriptedBackend::streaming(["x"]),
            &MemoryVault::with_session("tok"),
        )
        .await;
        assert_eq!(unknown, ContextMode::Anonymous);
    }
}
