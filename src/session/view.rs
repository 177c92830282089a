//! Calls a session makes into the host UI.

/// Right-hand compose button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAffordance {
    /// Input has text: the button sends it.
    Send,
    /// Input is empty: the button records a voice message.
    Record,
}

/// Scroll geometry of the timeline, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub offset_y: f64,
    pub content_height: f64,
    pub frame_height: f64,
}

impl ScrollMetrics {
    /// True when the viewport sits at (or past) the bottom of the content.
    pub fn is_at_bottom(&self) -> bool {
        self.offset_y >= self.content_height - self.frame_height
    }
}

/// Rendering side of the conversation screen. All methods default to no-ops.
pub trait ConversationView: Send + Sync {
    /// Message list contents changed; redraw.
    fn reload(&self) {}

    /// New messages arrived; redraw and lay out.
    fn finish_receiving(&self) {}

    fn scroll_to_bottom(&self) {}

    fn set_send_enabled(&self, _enabled: bool) {}

    fn set_compose_affordance(&self, _affordance: ComposeAffordance) {}

    fn start_activity_indicator(&self) {}

    fn stop_activity_indicator(&self) {}

    fn show_typing_indicator(&self) {}

    fn hide_typing_indicator(&self) {}

    fn set_title(&self, _title: Option<&str>) {}

    /// Current geometry, if the view has been laid out.
    fn scroll_metrics(&self) -> Option<ScrollMetrics> {
        None
    }

    fn set_scroll_offset(&self, _offset_y: f64) {}
}

/// View that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopView;

impl ConversationView for NoopView {}
