//! Previously captured images keyed by request fingerprint

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Shared, immutable image bytes.
pub type ImageBytes = Arc<[u8]>;

struct CachedOutput {
    bytes: ImageBytes,
    created_at: Instant,
}

/// Fingerprint → image map with a freshness window.
///
/// Expiry is lazy on read: a stale entry is reported as absent but stays in
/// the map until [`OutputCache::evict_stale`] or an overwrite removes it.
pub struct OutputCache {
    entries: Mutex<HashMap<String, CachedOutput>>,
    freshness: Duration,
}

impl OutputCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            freshness,
        }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Cached bytes for `fingerprint`, if younger than the freshness window.
    pub fn get(&self, fingerprint: &str) -> Option<ImageBytes> {
        let entries = self.entries.lock();
        let entry = entries.get(fingerprint)?;
        if entry.created_at.elapsed() < self.freshness {
            Some(entry.bytes.clone())
        } else {
            None
        }
    }

    pub fn put(&self, fingerprint: &str, bytes: ImageBytes) {
        let entry = CachedOutput {
            bytes,
            created_at: Instant::now(),
        };
        self.entries.lock().insert(fingerprint.to_string(), entry);
    }

    pub fn evict(&self, fingerprint: &str) -> bool {
        self.entries.lock().remove(fingerprint).is_some()
    }

    /// Drop every entry older than the freshness window.
    pub fn evict_stale(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|fingerprint, entry| {
            let keep = now.duration_since(entry.created_at) <= self.freshness;
            if !keep {
                debug!("Clearing old screenshot from cache: {}", fingerprint);
            }
            keep
        });
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3600);

    fn png(tag: &str) -> ImageBytes {
        Arc::from(tag.as_bytes())
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_read_as_absent() {
        let cache = OutputCache::new(WINDOW);
        cache.put("k", png("one"));
        assert_eq!(cache.get("k").as_deref(), Some(&b"one"[..]));

        tokio::time::advance(WINDOW).await;
        assert!(cache.get("k").is_none());
        // lazy expiry keeps the entry until a sweep
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_stale_only_drops_old_entries() {
        let cache = OutputCache::new(WINDOW);
        cache.put("old", png("a"));
        tokio::time::advance(Duration::from_secs(1800)).await;
        cache.put("new", png("b"));
        tokio::time::advance(Duration::from_secs(1801)).await;

        assert_eq!(cache.evict_stale(), 1);
        assert!(cache.get("new").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_overwrites_and_evict_removes() {
        let cache = OutputCache::new(WINDOW);
        cache.put("k", png("first"));
        cache.put("k", png("second"));
        assert_eq!(cache.get("k").as_deref(), Some(&b"second"[..]));
        assert!(cache.evict("k"));
        assert!(!cache.evict("k"));
        assert!(cache.is_empty());
    }
}
