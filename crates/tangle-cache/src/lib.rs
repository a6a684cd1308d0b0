//! In-process TTL cache for serialized feed page snapshots.
//!
//! Built once at startup and handed to request-scope code through app state.
//! Entries expire on their own: reads drop anything past its deadline and a
//! background sweep prunes the rest on an interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// TTL applied to every feed page snapshot.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(3600);

/// Deterministic cache key for a feed page.
pub fn page_key(page: i64) -> String {
    format!("threads_page_{page}")
}

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct PageCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a live entry. An expired entry is dropped and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        debug_assert!(!key.is_empty(), "empty cache key");

        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but is past its deadline. Drop it under a write lock.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
            debug!(key, "cache entry expired");
        }
        None
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        debug_assert!(!key.is_empty(), "empty cache key");

        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        debug!(key, ttl_secs = ttl.as_secs(), "cache entry written");
    }

    /// Returns true if the key was present.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            debug!(key, "cache entry evicted");
        }
        removed
    }

    /// Drop every expired entry. Returns how many were pruned.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that prunes expired entries on an interval.
pub async fn run_sweep_loop(cache: Arc<PageCache>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "cache sweep loop started");

    loop {
        interval.tick().await;
        let pruned = cache.sweep().await;
        if pruned > 0 {
            info!(pruned, "cache sweep pruned expired entries");
        }
    }
}

/// Guard against wedging the process on a cache that cannot even hold an
/// entry; cache bring-up failure is fatal at startup.
pub async fn verify_startup(cache: &PageCache) -> Result<(), String> {
    cache.set("startup_probe", "ok".into(), Duration::from_secs(1)).await;
    let probe = cache.get("startup_probe").await;
    cache.delete("startup_probe").await;
    match probe.as_deref() {
        Some("ok") => Ok(()),
        other => {
            warn!(?other, "cache startup probe failed");
            Err("cache startup probe failed".into())
        }
    }
}
