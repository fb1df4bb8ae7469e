use moka::future::Cache;
use std::time::Duration;

/// Short-lived cache of fetched headlines, keyed by source.
///
/// Entries are evicted after the TTL so each source is refetched at most
/// once per TTL window, regardless of how often cycles run.
#[derive(Clone)]
pub struct HeadlineCache {
    inner: Cache<String, Vec<String>>,
}

impl HeadlineCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, source: &str) -> Option<Vec<String>> {
        self.inner.get(source).await
    }

    pub async fn insert(&self, source: String, headlines: Vec<String>) {
        self.inner.insert(source, headlines).await;
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.inner.policy().time_to_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let cache = HeadlineCache::new(16, Duration::from_secs(60));
        cache
            .insert("wire".to_string(), vec!["Rates unchanged".to_string()])
            .await;

        let result = cache.get("wire").await;
        assert_eq!(result, Some(vec!["Rates unchanged".to_string()]));
    }

    #[tokio::test]
    async fn get_missing() {
        let cache = HeadlineCache::new(16, Duration::from_secs(60));
        assert_eq!(cache.get("nowhere").await, None);
    }

    #[test]
    fn reports_ttl() {
        let cache = HeadlineCache::new(16, Duration::from_secs(60));
        assert_eq!(cache.ttl(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn ttl_expiration() {
        let cache = HeadlineCache::new(16, Duration::from_millis(50));
        cache
            .insert("wire".to_string(), vec!["Old news".to_string()])
            .await;
        assert!(cache.get("wire").await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("wire").await.is_none());
    }
}
