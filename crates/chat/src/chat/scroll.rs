/// Distance from the bottom, in pixels, still treated as "at the bottom".
pub const NEAR_BOTTOM_THRESHOLD: f32 = 10.0;

/// Geometry of the message list viewport as last reported by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportMetrics {
    pub scroll_top: f32,
    pub client_height: f32,
    pub scroll_height: f32,
}

impl ViewportMetrics {
    pub fn new(scroll_top: f32, client_height: f32, scroll_height: f32) -> Self {
        Self {
            scroll_top,
            client_height,
            scroll_height,
        }
    }

    pub fn is_at_bottom(&self) -> bool {
        self.scroll_top + self.client_height >= self.scroll_height - NEAR_BOTTOM_THRESHOLD
    }

    /// Scroll offset that pins the viewport to the bottom.
    pub fn max_scroll_top(&self) -> f32 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// Tracks whether the reader has scrolled away from the live tail.
///
/// While following, every content change queues a jump to the bottom.
/// Scrolling up parks the view instead, until the reader either returns to
/// the bottom on their own or hits the jump-to-latest affordance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMonitor {
    metrics: ViewportMetrics,
    user_is_scrolling: bool,
    pending_scroll_to_bottom: bool,
}

impl ScrollMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one viewport report from the surface.
    pub fn observe_scroll(&mut self, metrics: ViewportMetrics) {
        self.metrics = metrics;
        self.user_is_scrolling = !metrics.is_at_bottom();
    }

    /// Called whenever message content changes. Keeps following unless the
    /// reader scrolled away.
    pub fn content_updated(&mut self) {
        if !self.user_is_scrolling {
            self.pending_scroll_to_bottom = true;
        }
    }

    /// Jump-to-latest affordance: forces the next scroll to the bottom and
    /// resumes following.
    pub fn request_scroll_to_bottom(&mut self) {
        self.user_is_scrolling = false;
        self.pending_scroll_to_bottom = true;
    }

    /// Consumes the queued jump. The surface scrolls to its current maximum
    /// offset when this returns true.
    pub fn apply_pending_scroll(&mut self) -> bool {
        let pending = self.pending_scroll_to_bottom;
        self.pending_scroll_to_bottom = false;
        pending
    }

    pub fn user_is_scrolling(&self) -> bool {
        self.user_is_scrolling
    }

    pub fn metrics(&self) -> ViewportMetrics {
        self.metrics
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
