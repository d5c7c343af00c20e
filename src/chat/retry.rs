use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RetryState {
    pub pending_text: Option<String>,
}

/// Remembers the text of the most recent failed send.
#[derive(Debug, Default)]
pub struct RetryController {
    state: RetryState,
}

impl RetryController {
    pub fn record_failure(&mut self, text: impl Into<String>) {
        self.state.pending_text = Some(text.into());
    }

    pub fn record_success(&mut self) {
        self.state.pending_text = None;
    }

    /// Text to resubmit, if any. Does not clear it.
    pub fn retry(&self) -> Option<&str> {
        self.state.pending_text.as_deref()
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }
}
