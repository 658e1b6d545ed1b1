use anyhow::Result;
use chat_relay::{ChatRelay, Dispatcher, RequestGuard, SettingsConfigProvider};
use common::proxy::chat_openai::OpenAIClient;
use common::settings::AppConfig;
use dotenvy::dotenv;
use std::sync::Arc;
use storage::{SettingsCache, Storage};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guard = api_server::logging_stdout();

    let config = AppConfig::from_vars(std::env::vars())?;
    info!(
        listen_addr = %config.listen_addr,
        restricted = config.restricted,
        upstream_timeout = ?config.upstream_timeout,
        "starting chat relay"
    );

    let storage = Storage::<SettingsCache>::new(&config.database_url).await?;
    let http_client = api_server::tools::build_http_client()?;

    let provider = SettingsConfigProvider::new(
        storage.clone(),
        config.env_settings,
        config.restricted,
        config.upstream_timeout,
    );
    let (dispatcher, workers) = Dispatcher::spawn(storage.clone(), storage.clone());
    let guard = RequestGuard::new(config.restricted, config.guard);
    let relay = Arc::new(
        ChatRelay::new(provider, OpenAIClient::new(http_client), dispatcher, guard)
            .with_daily_usage(storage),
    );

    api_server::run_api_server(config.listen_addr, relay).await?;
    workers.join().await;

    Ok(())
}
