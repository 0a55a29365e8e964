use super::message::USER_MESSAGE_LIMIT;

/// Draft input plus the gates that decide whether submit does anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    draft: String,
    is_streaming: bool,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    pub fn set_streaming(&mut self, is_streaming: bool) {
        self.is_streaming = is_streaming;
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// True while the draft holds nothing sendable.
    pub fn is_blank(&self) -> bool {
        self.draft.trim().is_empty()
    }

    /// Mirrors the send button state: an active stream, a blank draft, or a
    /// reached message cap all disable sending.
    pub fn can_submit(&self, user_message_count: usize) -> bool {
        !self.is_streaming && !self.is_blank() && user_message_count < USER_MESSAGE_LIMIT
    }

    /// Takes the draft for sending. Gated no-ops leave the draft in place.
    pub fn take_submission(&mut self, user_message_count: usize) -> Option<String> {
        if !self.can_submit(user_message_count) {
            return None;
        }
        Some(std::mem::take(&mut self.draft))
    }
}
