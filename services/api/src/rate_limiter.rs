//! Rate limiter guarding login and email verification against brute force

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed inside one window
    pub max_attempts: u32,
    pub window_seconds: u64,
    pub ban_duration_seconds: u64,
    /// Stale keys are swept once this many keys are tracked
    pub prune_threshold: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,        // 5 minutes
            ban_duration_seconds: 3600, // 1 hour
            prune_threshold: 1024,
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    attempts: u32,
    last_attempt: Instant,
    ban_expires: Option<Instant>,
}

impl RateLimiterEntry {
    /// Neither banned nor inside its window any more
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.ban_expires.is_none_or(|ban_expires| now >= ban_expires)
            && now.duration_since(self.last_attempt) >= window
    }
}

/// Attempt counter per key (an identity such as `login:a@b.com`)
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt for `key`; false once the key is banned
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        if entries.len() >= self.config.prune_threshold {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_stale(now, window));
            debug!("Pruned {} stale rate limiter keys", before - entries.len());
        }

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            last_attempt: now,
            ban_expires: None,
        });

        if let Some(ban_expires) = entry.ban_expires {
            if now >= ban_expires {
                entry.attempts = 0;
                entry.ban_expires = None;
            } else {
                return false;
            }
        }

        if now.duration_since(entry.last_attempt) >= window {
            entry.attempts = 0;
        }

        if entry.attempts >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return false;
        }

        entry.attempts += 1;
        entry.last_attempt = now;

        true
    }

    /// Forget every attempt for `key`, called after a successful attempt
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window_seconds: 60,
            ban_duration_seconds: 600,
            prune_threshold: 4,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_bans_after_max_attempts() {
        let limiter = limiter();
        for _ in 0..3 {
            assert!(limiter.is_allowed("login:a@b.com").await);
        }
        assert!(!limiter.is_allowed("login:a@b.com").await);
        // other keys are unaffected
        assert!(limiter.is_allowed("login:c@d.com").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_expires() {
        let limiter = limiter();
        for _ in 0..4 {
            limiter.is_allowed("k").await;
        }
        assert!(!limiter.is_allowed("k").await);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(limiter.is_allowed("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_attempts() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.is_allowed("k").await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.is_allowed("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_attempts() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.is_allowed("k").await;
        }
        limiter.reset("k").await;
        assert!(limiter.is_allowed("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_keys_are_pruned() {
        let limiter = limiter();
        for i in 0..4 {
            assert!(limiter.is_allowed(&format!("login:{}@b.com", i)).await);
        }
        // banned key must outlive its window
        for _ in 0..4 {
            limiter.is_allowed("login:banned@b.com").await;
        }
        assert_eq!(limiter.tracked_keys().await, 5);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.is_allowed("login:new@b.com").await);
        assert_eq!(limiter.tracked_keys().await, 2);
        assert!(!limiter.is_allowed("login:banned@b.com").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_inside_window_are_kept() {
        let limiter = limiter();
        for i in 0..6 {
            assert!(limiter.is_allowed(&format!("login:{}@b.com", i)).await);
        }
        assert_eq!(limiter.tracked_keys().await, 6);
    }
}
