pub mod chat;
pub mod db;
pub mod nutrition;
pub mod settings;
pub mod transport;

use chat::{ChatError, ChatSession};
use db::Database;
use settings::ChatSettings;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use transport::http::HttpTransport;

/// Installs a fmt subscriber filtered by `RUST_LOG`. Safe to call more than
/// once; later calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nutri_chat=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens the local store under `app_dir`, builds the HTTP transport from the
/// stored settings and returns a session with history already loaded.
pub async fn start(app_dir: &Path) -> Result<ChatSession<HttpTransport>, ChatError> {
    let database = Arc::new(Database::new(app_dir)?);
    let settings = ChatSettings::load(&database)?;
    tracing::info!(base_url = %settings.api_base_url, "starting chat session");

    let transport = HttpTransport::new(&settings)?.with_store(database);
    let mut session = ChatSession::new(transport, &settings);
    session.load().await;
    Ok(session)
}
