#![deny(unsafe_code)]

/// Mentor chat popup core.
///
/// This crate holds the conversation domain model and the headless popup
/// coordinator that host surfaces embed. Network transport lives in
/// `mentor-backend`, rendering primitives in `mentor-render`, and local
/// persistence in `mentor-store`.
pub mod chat;
/// Settings persistence.
pub mod settings;

pub use chat::{ContextMode, DisplayMode, MentorPopup, PopupOptions};
pub use settings::{PopupSettings, SettingsStore};

/// Returns a stable marker used by integration smoke tests.
pub fn smoke_marker() -> &'static str {
    "mentor-chat"
}
