//! Memoization and throttling around the external backends.
//!
//! Both components are constructed explicitly and passed in where they are
//! needed; there are no process-wide singletons. Time is based on
//! `tokio::time`, so paused-clock tests control it deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::core::error::Result;

/// How many inserts between amortized expiry sweeps.
const SWEEP_EVERY: u64 = 32;

/// Content-addressed cache key: sha-256 over the serialized request
/// parameter structure. Requests differing in any parameter (the backend
/// included) hash to different keys.
pub fn request_fingerprint<T: Serialize>(request: &T) -> Result<String> {
    let bytes = serde_json::to_vec(request)?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct CacheEntry<V> {
    stored_at: Instant,
    value: V,
}

/// Key-value cache with a fixed time-to-live. Expiry is passive (checked
/// on read) with a sweep amortized over inserts; `sweep` is also public
/// for callers that want to run it on their own schedule.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    inserts: Mutex<u64>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
            inserts: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: V) {
        lock(&self.entries).insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                value,
            },
        );

        let due = {
            let mut inserts = lock(&self.inserts);
            *inserts += 1;
            *inserts % SWEEP_EVERY == 0
        };
        if due {
            self.sweep();
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }
}

/// Throttle on outbound backend calls: at most `quota` calls may start
/// within any rolling window. A call over quota waits for room instead of
/// failing, and the wait is bounded by the window length.
pub struct RateLimiter {
    quota: u32,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(quota: u32, window: Duration) -> Self {
        RateLimiter {
            quota: quota.max(1),
            window,
            starts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_minute(quota: u32) -> Self {
        Self::new(quota, Duration::from_secs(60))
    }

    /// Block until the call may start. The lock is only held to inspect
    /// and record timestamps, never across the sleep.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut starts = lock(&self.starts);
                let now = Instant::now();
                while starts
                    .front()
                    .map_or(false, |&t| now.duration_since(t) >= self.window)
                {
                    starts.pop_front();
                }

                if (starts.len() as u32) < self.quota {
                    starts.push_back(now);
                    return;
                }

                match starts.front() {
                    Some(&oldest) => (oldest + self.window).duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, deferring call");
            sleep(wait.max(Duration::from_millis(5))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_within_ttl() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(3600));
        cache.insert("k".to_string(), "v".to_string());
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_passively_on_read() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 1);

        advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("k"), None);
        // the expired entry was dropped on read, not just hidden
        assert_eq!(cache.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired_entries() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("old".to_string(), 1);
        advance(Duration::from_secs(45)).await;
        cache.insert("fresh".to_string(), 2);
        advance(Duration::from_secs(30)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get("fresh"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_admits_quota_without_delay() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let before = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_defers_calls_over_quota() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        // Third call must wait until the first leaves the rolling window.
        limiter.acquire().await;

        let elapsed = Instant::now().duration_since(start);
        assert!(elapsed >= Duration::from_secs(60), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_never_over_admits_in_any_window() {
        let quota = 3;
        let window = Duration::from_secs(60);
        let limiter = RateLimiter::new(quota, window);

        let mut admitted = Vec::new();
        for _ in 0..8 {
            limiter.acquire().await;
            admitted.push(Instant::now());
        }

        for i in 0..admitted.len() {
            let window_end = admitted[i] + window;
            let in_window = admitted[i..]
                .iter()
                .filter(|&&t| t < window_end)
                .count();
            assert!(in_window <= quota as usize, "window starting at call {} admitted {}", i, in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fingerprint_is_deterministic_and_parameter_sensitive() {
        let a = request_fingerprint(&("ollama", "qwen2.5", 3u32)).unwrap();
        let b = request_fingerprint(&("ollama", "qwen2.5", 3u32)).unwrap();
        let c = request_fingerprint(&("openai", "qwen2.5", 3u32)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
