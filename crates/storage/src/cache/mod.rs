pub mod lru;

use std::time::Duration;

/// Async key/value cache in front of slower lookups. Values are cloned
/// out, so they should be cheap to clone.
pub trait KVCache<V>: Clone + Send + Sync + 'static
where
    V: Clone + Send + Sync + 'static,
{
    fn init() -> Self;

    fn get(&self, key: &str) -> impl Future<Output = Option<V>> + Send;

    fn set(&self, key: &str, value: V) -> impl Future<Output = ()> + Send;
}

/// Capacity and lifetime of a cache's entries.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub max_capacity: u64,
    pub time_to_live: Duration,
}

/// Admin edits to the settings row become visible within a minute.
pub const SETTINGS_POLICY: CachePolicy = CachePolicy {
    max_capacity: 16,
    time_to_live: Duration::from_secs(60),
};

pub const CONVERSATION_POLICY: CachePolicy = CachePolicy {
    max_capacity: 1000,
    time_to_live: Duration::from_secs(7200),
};
