use std::{collections::HashMap, time::Duration};

use parking_lot::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source: String,
    target: String,
    text: String,
}

impl CacheKey {
    fn new(source: &str, target: &str, text: &str) -> Self {
        Self {
            source: source.to_owned(),
            target: target.to_owned(),
            text: text.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    created_at: Instant,
}

/// Translation memo with lazy expiry: stale entries are only noticed on read.
pub struct TranslationCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn lookup(&self, source: &str, target: &str, text: &str) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(&CacheKey::new(source, target, text))?;
        if entry.created_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.text.clone())
    }

    pub fn store(&self, source: &str, target: &str, text: &str, translated: &str) {
        self.entries.write().insert(
            CacheKey::new(source, target, text),
            CacheEntry {
                text: translated.to_owned(),
                created_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_miss_after() {
        let cache = TranslationCache::new(Duration::from_secs(600));
        cache.store("pt", "en", "olá", "hello");

        assert_eq!(cache.lookup("pt", "en", "olá").as_deref(), Some("hello"));
        assert_eq!(cache.lookup("en", "pt", "olá"), None);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.lookup("pt", "en", "olá"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn store_overwrites_and_refreshes() {
        let cache = TranslationCache::new(Duration::from_secs(60));
        cache.store("pt", "en", "olá", "hi");
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.store("pt", "en", "olá", "hello");
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.lookup("pt", "en", "olá").as_deref(), Some("hello"));
        assert_eq!(cache.len(), 1);
    }
}
