pub mod http;

use crate::db::models::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Profile {
    pub avatar_ref: Option<String>,
}

/// Backend operations the chat session depends on. Every call may fail;
/// the session decides how each failure is surfaced.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Previously exchanged messages. An empty log is a valid first run.
    async fn fetch_history(&self) -> Result<Vec<Message>, TransportError>;

    /// Sends user text, returns the assistant reply.
    async fn send_message(&self, text: &str) -> Result<String, TransportError>;

    /// Submits a meal photo, returns the assistant's analysis text.
    async fn analyze_image(&self, image: &[u8]) -> Result<String, TransportError>;

    async fn fetch_profile(&self) -> Result<Profile, TransportError>;

    /// Best-effort storage of an appended message.
    fn persist(&self, message: &Message) -> Result<(), TransportError>;

    /// Messages stored by [`Self::persist`], oldest first. Used when history
    /// cannot be fetched.
    fn cached_history(&self) -> Result<Vec<Message>, TransportError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl Serialize for TransportError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
