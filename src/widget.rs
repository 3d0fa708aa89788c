/// Shown in place of the conversation whenever connectivity is offline.
pub const OFFLINE_NOTICE: &str = "Chat service offline, try again later.";
pub const GREETING: &str = "Hi! How can we help?";
pub const GREETING_HINT: &str = "Ask us about our services, pricing, or anything else.";
pub const RESUME_NOTICE: &str = "Resuming your previous conversation";

/// Open/closed panel plus the unread badge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WidgetState {
    is_open: bool,
    has_notification: bool,
}

impl WidgetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn has_notification(&self) -> bool {
        self.has_notification
    }

    pub fn open(&mut self) {
        self.is_open = true;
        self.has_notification = false;
    }

    pub fn close(&mut self) {
        self.is_open = false;
    }

    pub fn toggle(&mut self) {
        if self.is_open {
            self.close();
        } else {
            self.open();
        }
    }

    /// Only raised while the panel is closed.
    pub fn show_notification(&mut self) {
        if !self.is_open {
            self.has_notification = true;
        }
    }

    pub fn clear_notification(&mut self) {
        self.has_notification = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_clears_the_badge() {
        let mut widget = WidgetState::new();
        widget.show_notification();
        assert!(widget.has_notification());

        widget.toggle();
        assert!(widget.is_open());
        assert!(!widget.has_notification());
    }

    #[test]
    fn no_badge_while_open() {
        let mut widget = WidgetState::new();
        widget.open();
        widget.show_notification();
        assert!(!widget.has_notification());

        widget.close();
        widget.show_notification();
        assert!(widget.has_notification());
        widget.clear_notification();
        assert!(!widget.has_notification());
    }
}
