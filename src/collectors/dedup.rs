//! Process-wide deduplication by URL and by normalized content hash.
//!
//! Content identity ignores case and whitespace layout: bodies are
//! lower-cased, trimmed and whitespace-collapsed before hashing with SHA-256.
//! The cache is memory-only; `prime` can seed it from stored records.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Lookup and registration of already-collected items.
///
/// `claim` is the check-then-insert used by the pipeline; it must be atomic so
/// two concurrent topics cannot both accept the same item.
pub trait SeenIndex: Send + Sync {
    /// Whether the URL or the normalized content has been seen.
    fn seen(&self, url: &str, content: &str) -> bool;

    /// Register both keys.
    fn mark(&self, url: &str, content: &str);

    /// Register both keys if neither is known. Returns false on a duplicate.
    fn claim(&self, url: &str, content: &str) -> bool;

    /// Undo a successful `claim`, e.g. when the item could not be stored.
    fn release(&self, url: &str, content: &str);
}

/// Lower-case, trim, and collapse whitespace runs to one space.
pub fn normalize_content(content: &str) -> String {
    content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the normalized content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
struct SeenKeys {
    urls: HashSet<String>,
    hashes: HashSet<String>,
}

/// In-memory dedup cache shared by every collector.
#[derive(Debug, Default)]
pub struct DedupCache {
    keys: Mutex<SeenKeys>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, SeenKeys> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_duplicate_url(&self, url: &str) -> bool {
        self.keys().urls.contains(url)
    }

    pub fn is_duplicate_content(&self, content: &str) -> bool {
        let hash = content_hash(content);
        self.keys().hashes.contains(&hash)
    }

    pub fn add_url(&self, url: &str) {
        self.keys().urls.insert(url.to_string());
    }

    pub fn add_content(&self, content: &str) {
        let hash = content_hash(content);
        self.keys().hashes.insert(hash);
    }

    /// Seed the cache from previously stored `(url, content)` pairs.
    pub fn prime<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut count = 0;
        let mut keys = self.keys();
        for (url, content) in items {
            keys.urls.insert(url);
            keys.hashes.insert(content_hash(&content));
            count += 1;
        }
        debug!(
            "Primed dedup cache with {} items ({} urls, {} hashes)",
            count,
            keys.urls.len(),
            keys.hashes.len()
        );
        count
    }

    pub fn clear(&self) {
        let mut keys = self.keys();
        keys.urls.clear();
        keys.hashes.clear();
    }

    /// Number of known URLs and content hashes.
    pub fn len(&self) -> (usize, usize) {
        let keys = self.keys();
        (keys.urls.len(), keys.hashes.len())
    }

    pub fn is_empty(&self) -> bool {
        let keys = self.keys();
        keys.urls.is_empty() && keys.hashes.is_empty()
    }
}

impl SeenIndex for DedupCache {
    fn seen(&self, url: &str, content: &str) -> bool {
        let hash = content_hash(content);
        let keys = self.keys();
        keys.urls.contains(url) || keys.hashes.contains(&hash)
    }

    fn mark(&self, url: &str, content: &str) {
        let hash = content_hash(content);
        let mut keys = self.keys();
        keys.urls.insert(url.to_string());
        keys.hashes.insert(hash);
    }

    fn claim(&self, url: &str, content: &str) -> bool {
        let hash = content_hash(content);
        let mut keys = self.keys();
        if keys.urls.contains(url) || keys.hashes.contains(&hash) {
            return false;
        }
        keys.urls.insert(url.to_string());
        keys.hashes.insert(hash);
        true
    }

    fn release(&self, url: &str, content: &str) {
        let hash = content_hash(content);
        let mut keys = self.keys();
        keys.urls.remove(url);
        keys.hashes.remove(&hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_normalization_is_idempotent() {
        for s in ["  Hello\n\tWorld  ", "ALREADY normal", "", "a  b   c"] {
            let once = normalize_content(s);
            assert_eq!(normalize_content(&once), once);
            assert_eq!(content_hash(s), content_hash(&once));
        }
    }

    #[test]
    fn test_hash_ignores_case_and_spacing() {
        assert_eq!(
            content_hash("Breaking  News\ttoday"),
            content_hash("breaking news today")
        );
        assert_ne!(content_hash("breaking news"), content_hash("other news"));
        assert_eq!(content_hash("x").len(), 64);
    }

    #[test]
    fn test_url_lookup_after_add() {
        let cache = DedupCache::new();
        assert!(!cache.is_duplicate_url("https://a.com"));
        cache.add_url("https://a.com");
        assert!(cache.is_duplicate_url("https://a.com"));
        assert!(!cache.is_duplicate_url("https://b.com"));
    }

    #[test]
    fn test_content_lookup_after_add() {
        let cache = DedupCache::new();
        cache.add_content("Some Body   text");
        assert!(cache.is_duplicate_content("some body text"));
        assert!(!cache.is_duplicate_content("some other text"));
    }

    #[test]
    fn test_claim_and_release() {
        let cache = DedupCache::new();
        assert!(cache.claim("https://a.com", "body one"));
        assert!(!cache.claim("https://a.com", "body two"));
        assert!(!cache.claim("https://b.com", "BODY   one"));
        assert!(cache.seen("https://a.com", "unrelated"));

        cache.release("https://a.com", "body one");
        assert!(!cache.seen("https://a.com", "body one"));
        assert!(cache.claim("https://a.com", "body one"));
    }

    #[test]
    fn test_prime_and_clear() {
        let cache = DedupCache::new();
        let n = cache.prime(vec![
            ("https://a.com".to_string(), "first".to_string()),
            ("https://b.com".to_string(), "second".to_string()),
        ]);
        assert_eq!(n, 2);
        assert_eq!(cache.len(), (2, 2));
        assert!(cache.seen("https://c.com", "SECOND"));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_claims_accept_once() {
        let cache = Arc::new(DedupCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.claim("https://same.example", "same body"))
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
    }
}
