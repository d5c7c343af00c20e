use crate::db::Database;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

pub const API_BASE_URL: &str = "api_base_url";
pub const API_TOKEN: &str = "api_token";
pub const REQUEST_TIMEOUT_SECS: &str = "request_timeout_secs";
pub const FAILURE_REPLY: &str = "failure_reply";

const SETTING_KEYS: &[&str] = &[API_BASE_URL, API_TOKEN, REQUEST_TIMEOUT_SECS, FAILURE_REPLY];

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FAILURE_REPLY: &str =
    "Desculpe, não consegui responder agora. Verifique sua conexão e tente novamente.";

/// Runtime configuration, read from the `settings` table with defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatSettings {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Text of the assistant message appended when a send fails.
    pub failure_reply: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            failure_reply: DEFAULT_FAILURE_REPLY.to_string(),
        }
    }
}

impl ChatSettings {
    pub fn load(db: &Database) -> rusqlite::Result<Self> {
        let defaults = Self::default();

        let request_timeout_secs = match db.get_setting(REQUEST_TIMEOUT_SECS)? {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "invalid request_timeout_secs, using default");
                defaults.request_timeout_secs
            }),
            None => defaults.request_timeout_secs,
        };

        Ok(Self {
            api_base_url: db
                .get_setting(API_BASE_URL)?
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            api_token: db.get_setting(API_TOKEN)?.filter(|t| !t.is_empty()),
            request_timeout_secs,
            failure_reply: db
                .get_setting(FAILURE_REPLY)?
                .unwrap_or(defaults.failure_reply),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Settings as shown to the user, with the token masked.
    pub fn display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(API_BASE_URL.to_string(), self.api_base_url.clone());
        map.insert(
            REQUEST_TIMEOUT_SECS.to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert(FAILURE_REPLY.to_string(), self.failure_reply.clone());
        if let Some(token) = &self.api_token {
            map.insert(API_TOKEN.to_string(), mask(token));
        }
        map
    }
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

pub fn set_setting(db: &Database, key: &str, value: &str) -> Result<(), String> {
    if !SETTING_KEYS.contains(&key) {
        return Err(format!("Unknown setting key: {}", key));
    }
    db.set_setting(key, value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_on_empty_table() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(ChatSettings::load(&db).unwrap(), ChatSettings::default());
    }

    #[test]
    fn test_load_reads_stored_values() {
        let db = Database::open_in_memory().unwrap();
        set_setting(&db, API_BASE_URL, "https://coach.example.com/api/").unwrap();
        set_setting(&db, API_TOKEN, "tok_1234567890").unwrap();
        set_setting(&db, REQUEST_TIMEOUT_SECS, "15").unwrap();

        let settings = ChatSettings::load(&db).unwrap();
        assert_eq!(settings.api_base_url, "https://coach.example.com/api");
        assert_eq!(settings.api_token.as_deref(), Some("tok_1234567890"));
        assert_eq!(settings.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let db = Database::open_in_memory().unwrap();
        set_setting(&db, REQUEST_TIMEOUT_SECS, "soon").unwrap();
        let settings = ChatSettings::load(&db).unwrap();
        assert_eq!(settings.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(set_setting(&db, "theme", "dark").is_err());
    }

    #[test]
    fn test_display_masks_token() {
        let settings = ChatSettings {
            api_token: Some("tok_1234567890".to_string()),
            ..ChatSettings::default()
        };
        let map = settings.display_map();
        assert_eq!(map[API_TOKEN], "tok_...7890");
    }
}
