use tracing::warn;

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    is_error: bool,
}

/// Last message shown to the user.
#[derive(Debug, Default)]
pub struct StatusBar {
    message: Option<StatusMessage>,
}

impl StatusBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_message(&mut self, text: impl Into<String>) {
        self.message = Some(StatusMessage {
            text: text.into(),
            is_error: false,
        });
    }

    /// Show `"{category}: {detail}"` as an error.
    pub fn set_error_message(&mut self, category: &str, detail: &str) {
        let text = format!("{category}: {detail}");
        warn!(status = %text, "error reported to status bar");
        self.message = Some(StatusMessage { text, is_error: true });
    }

    pub fn text(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.text.as_str())
    }

    pub fn is_error(&self) -> bool {
        self.message.as_ref().is_some_and(|m| m.is_error)
    }

    pub fn clear(&mut self) {
        self.message = None;
    }
}
