mod auth;
mod configuration;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use palaver::providers::factory;
use palaver::store::{file::FileStore, memory::MemoryStore, ConversationStore};

use crate::auth::TokenAuthenticator;
use crate::configuration::{Settings, StorageSettings};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let Settings {
        server,
        provider,
        storage,
        auth,
    } = Settings::new()?;

    let store: Arc<dyn ConversationStore> = match storage {
        StorageSettings::Memory => Arc::new(MemoryStore::new()),
        StorageSettings::File { path } => Arc::new(FileStore::new(path).await?),
    };
    let provider = factory::get_provider(provider.into_config())?;
    let authenticator = Arc::new(TokenAuthenticator::new(auth.token_map()));

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(AppState {
        store,
        provider,
        authenticator,
    })
    .layer(cors);

    let listener = tokio::net::TcpListener::bind(server.socket_addr()).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
