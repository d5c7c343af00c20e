use super::{Profile, Transport, TransportError};
use crate::db::models::{Message, Role};
use crate::db::Database;
use crate::settings::ChatSettings;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub api_token: Option<String>,
}

impl From<&ChatSettings> for HttpConfig {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            base_url: settings.api_base_url.clone(),
            api_token: settings.api_token.clone(),
        }
    }
}

#[derive(Deserialize)]
struct HistoryEntry {
    id: Option<String>,
    role: Role,
    #[serde(default)]
    text: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl HistoryEntry {
    fn into_message(self) -> Message {
        let mut message = match self.image_url {
            Some(url) => Message::image(self.role, url, self.text, self.created_at),
            None => Message::text(self.role, self.text, self.created_at),
        };
        if let Some(id) = self.id {
            message.id = id;
        }
        message
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    reply: String,
}

#[derive(Serialize)]
struct ImageRequest {
    image: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    analysis: String,
}

#[derive(Deserialize)]
struct ProfileResponse {
    avatar_url: Option<String>,
}

/// [`Transport`] backed by the coaching backend's JSON API, with an optional
/// local store for persisting appended messages.
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
    store: Option<Arc<Database>>,
}

impl HttpTransport {
    pub fn new(settings: &ChatSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            config: HttpConfig::from(settings),
            store: None,
        })
    }

    pub fn with_store(mut self, store: Arc<Database>) -> Self {
        self.store = Some(store);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }
}

async fn check(resp: Response) -> Result<Response, TransportError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(TransportError::Api {
            status,
            message: text,
        });
    }
    Ok(resp)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_history(&self) -> Result<Vec<Message>, TransportError> {
        let resp = self
            .authorized(self.client.get(self.url("chat/history")))
            .send()
            .await?;
        let entries: Vec<HistoryEntry> = check(resp).await?.json().await?;
        Ok(entries.into_iter().map(HistoryEntry::into_message).collect())
    }

    async fn send_message(&self, text: &str) -> Result<String, TransportError> {
        let resp = self
            .authorized(self.client.post(self.url("chat/message")))
            .json(&SendRequest { message: text })
            .send()
            .await?;
        let data: SendResponse = check(resp).await?.json().await?;
        Ok(data.reply)
    }

    async fn analyze_image(&self, image: &[u8]) -> Result<String, TransportError> {
        if image.is_empty() {
            return Err(TransportError::Parse("empty image payload".to_string()));
        }
        let body = ImageRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
        };
        let resp = self
            .authorized(self.client.post(self.url("chat/image")))
            .json(&body)
            .send()
            .await?;
        let data: ImageResponse = check(resp).await?.json().await?;
        Ok(data.analysis)
    }

    async fn fetch_profile(&self) -> Result<Profile, TransportError> {
        let resp = self
            .authorized(self.client.get(self.url("profile")))
            .send()
            .await?;
        let data: ProfileResponse = check(resp).await?.json().await?;
        Ok(Profile {
            avatar_ref: data.avatar_url,
        })
    }

    fn persist(&self, message: &Message) -> Result<(), TransportError> {
        match &self.store {
            Some(db) => {
                db.add_message(message)?;
                debug!(id = %message.id, kind = message.kind.as_str(), "message persisted");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn cached_history(&self) -> Result<Vec<Message>, TransportError> {
        match &self.store {
            Some(db) => Ok(db.get_messages()?),
            None => Ok(Vec::new()),
        }
    }
}
