pub mod cache;
mod health;
mod ledger;
mod settings;

pub mod error;
use cache::KVCache;
pub use cache::lru::{ConversationCache, SettingsCache};
use common::settings::AiChatSettings;
use error::Result;
pub use settings::AI_CHAT;
use sqlx::{PgPool, Postgres, migrate::MigrateDatabase, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres access for settings, billing and chat logs, with a cache `C`
/// in front of the settings row.
#[derive(Clone)]
pub struct Storage<C> {
    pool:  PgPool,
    cache: C,
}

impl<C: KVCache<AiChatSettings>> Storage<C> {
    /// Connects, creating the database and applying migrations when needed,
    /// then loads the settings cache and starts the health watcher.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = connect(database_url).await?;
        let storage = Self {
            pool:  pool.clone(),
            cache: C::init(),
        };
        storage.warm_up().await?;

        tokio::spawn(health::watch(pool, health::CHECK_INTERVAL, health::QUERY_TIMEOUT));
        Ok(storage)
    }
}

async fn connect(database_url: &str) -> Result<PgPool> {
    if !Postgres::database_exists(database_url).await? {
        info!("database missing, creating it");
        Postgres::create_database(database_url).await?;
    }

    debug!("Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("database migrations applied");
    Ok(pool)
}
