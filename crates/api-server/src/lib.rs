pub use common::logging_stdout;
use chat_relay::{ChatRelay, SettingsConfigProvider};
use common::proxy::chat_openai::OpenAIClient;
use error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use storage::{SettingsCache, Storage};
use volo_http::Address;
use volo_http::server::{Router, Server};
use volo_http::utils::Extension;

pub mod error;
pub mod handlers;
pub mod requests;
pub mod tools;

/// The relay as wired in production: settings and daily usage from
/// Postgres, OpenAI compatible upstream.
pub type AppRelay =
    ChatRelay<SettingsConfigProvider<Storage<SettingsCache>>, OpenAIClient, Storage<SettingsCache>>;

pub async fn run_api_server(addr: SocketAddr, relay: Arc<AppRelay>) -> Result<()> {
    let app = Router::new()
        .merge(handlers::chat_process_router())
        .merge(handlers::health_router())
        .layer(Extension(relay));
    let addr = Address::from(addr);
    Server::new(app)
        .run(addr)
        .await
        .map_err(|e| Error::Server(e.to_string().into()))
}
