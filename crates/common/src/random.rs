use faststr::FastStr;
use rand::rng;
use rand::seq::IndexedRandom;

/// A pool of upstream API keys. One key is drawn uniformly at random for
/// every request; a failing key is never retried with another one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPool(Vec<FastStr>);

impl KeyPool {
    /// Parses a newline separated key list, ignoring blank lines.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.lines()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(|key| FastStr::new(key))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `rand::rng()` is thread local, so concurrent requests never contend
    /// on the random source.
    pub fn pick(&self) -> Option<&FastStr> {
        self.0.choose(&mut rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty() {
        let pool = KeyPool::parse("");
        assert!(pool.is_empty());
        assert!(pool.pick().is_none());

        let blanks = KeyPool::parse("\n  \n\r\n");
        assert!(blanks.is_empty(), "blank lines must not become keys");
    }

    #[test]
    fn test_parse_newline_separated() {
        let pool = KeyPool::parse("sk-a\n sk-b \r\n\nsk-c\n");
        assert_eq!(pool.len(), 3);
        assert_eq!(pool, KeyPool(vec!["sk-a".into(), "sk-b".into(), "sk-c".into()]));
    }

    #[test]
    fn test_single_key_always_returned() {
        let pool = KeyPool::parse("sk-only");
        for _ in 0..10 {
            assert_eq!(pool.pick().map(FastStr::as_str), Some("sk-only"));
        }
    }

    #[test]
    fn test_pick_distribution_is_uniform() {
        let pool = KeyPool::parse("sk-1\nsk-2\nsk-3");
        let samples = 10_000;
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..samples {
            let key = pool.pick().expect("non-empty pool");
            *counts.entry(key.as_str()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3, "every key must be selected: {counts:?}");
        // Expected 3333 per key; the bound is more than 10 standard deviations.
        for (key, count) in &counts {
            assert!(
                (2900..=3800).contains(count),
                "key {key} selected {count} times out of {samples}: {counts:?}"
            );
        }
    }
}
