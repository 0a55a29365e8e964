pub mod copy;
pub mod highlight;
pub mod markdown;

pub use copy::{
    COPY_FEEDBACK_DURATION, Clipboard, CopyError, CopyIndicator, CopyResult, MemoryClipboard,
    SystemClipboard,
};
pub use highlight::{CodeSpan, HighlightedLine, Rgb, highlight_code};
pub use markdown::{Block, Inline, MessageDocument, parse_inline};
