use std::time::{Duration, Instant};

use snafu::{ResultExt, Snafu};

/// How long a block shows its copied state before reverting.
pub const COPY_FEEDBACK_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CopyError {
    #[snafu(display("clipboard unavailable on `{stage}`: {source}"))]
    ClipboardUnavailable {
        stage: &'static str,
        source: arboard::Error,
    },

    #[snafu(display("clipboard write failed on `{stage}`: {source}"))]
    ClipboardWrite {
        stage: &'static str,
        source: arboard::Error,
    },
}

pub type CopyResult<T> = Result<T, CopyError>;

/// Destination for copied code.
pub trait Clipboard: Send {
    fn set_text(&mut self, text: &str) -> CopyResult<()>;
}

/// System clipboard backed by arboard.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> CopyResult<Self> {
        let inner = arboard::Clipboard::new().context(ClipboardUnavailableSnafu {
            stage: "open-clipboard",
        })?;
        Ok(Self { inner })
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> CopyResult<()> {
        self.inner.set_text(text).context(ClipboardWriteSnafu {
            stage: "write-clipboard",
        })
    }
}

/// In-memory clipboard for tests and QA scenarios.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: &str) -> CopyResult<()> {
        self.contents = Some(text.to_string());
        Ok(())
    }
}

/// Per-block copied indicator.
///
/// At most one block shows the copied state at a time; copying another block
/// moves the indicator there. The state reverts on its own once
/// `COPY_FEEDBACK_DURATION` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyIndicator {
    state: CopyIndicatorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CopyIndicatorState {
    #[default]
    Idle,
    Copied { block_index: usize, since: Instant },
}

impl CopyIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `text` and moves the indicator onto `block_index`.
    pub fn copy_block(
        &mut self,
        clipboard: &mut dyn Clipboard,
        block_index: usize,
        text: &str,
        now: Instant,
    ) -> CopyResult<()> {
        clipboard.set_text(text)?;
        self.mark_copied(block_index, now);
        Ok(())
    }

    pub fn mark_copied(&mut self, block_index: usize, now: Instant) {
        self.state = CopyIndicatorState::Copied {
            block_index,
            since: now,
        };
    }

    /// Reverts to idle once the feedback window has elapsed. Returns true
    /// when the state changed, so callers know a redraw is due.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let CopyIndicatorState::Copied { since, .. } = self.state {
            if now.duration_since(since) >= COPY_FEEDBACK_DURATION {
                self.state = CopyIndicatorState::Idle;
                return true;
            }
        }
        false
    }

    /// Block currently showing the copied state, if any.
    pub fn copied_block(&self) -> Option<usize> {
        match self.state {
            CopyIndicatorState::Copied { block_index, .. } => Some(block_index),
            CopyIndicatorState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingClipboard;

    impl Clipboard for FailingClipboard {
        fn set_text(&mut self, _text: &str) -> CopyResult<()> {
            Err(arboard::Error::Unknown {
                description: "scripted failure".to_string(),
            })
            .context(ClipboardWriteSnafu {
                stage: "write-clipboard",
            })
        }
    }

    #[test]
    fn copy_block_writes_to_clipboard() {
        let mut clipboard = MemoryClipboard::new();
        let mut indicator = CopyIndicator::new();

        indicator
            .copy_block(&mut clipboard, 2, "let x = 1;", Instant::now())
            .unwrap();

        assert_eq!(clipboard.contents.as_deref(), Some("let x = 1;"));
        assert_eq!(indicator.copied_block(), Some(2));
    }

    #[test]
    fn copied_state_reverts_after_feedback_window() {
        let start = Instant::now();
        let mut indicator = CopyIndicator::new();
        indicator.mark_copied(0, start);

        assert!(!indicator.tick(start + Duration::from_millis(1999)));
        assert_eq!(indicator.copied_block(), Some(0));

        assert!(indicator.tick(start + COPY_FEEDBACK_DURATION));
        assert_eq!(indicator.copied_block(), None);

        // A second tick is a no-op.
        assert!(!indicator.tick(start + Duration::from_secs(5)));
    }

    #[test]
    fn failed_copy_leaves_indicator_idle() {
        let mut clipboard = FailingClipboard;
        let mut indicator = CopyIndicator::new();

        let result = indicator.copy_block(&mut clipboard, 0, "code", Instant::now());
        assert!(result.is_err());
        assert_eq!(indicator.copied_block(), None);
    }

    #[test]
    fn copying_another_block_moves_the_indicator() {
        let start = Instant::now();
        let mut clipboard = MemoryClipboard::new();
        let mut indicator = CopyIndicator::new();

        indicator
            .copy_block(&mut clipboard, 0, "first", start)
            .unwrap();
        indicator
            .copy_block(&mut clipboard, 3, "second", start + Duration::from_millis(500))
            .unwrap();

        assert_eq!(indicator.copied_block(), Some(3));
        assert_eq!(clipboard.contents.as_deref(), Some("second"));
    }
}
