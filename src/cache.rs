//! Caching for the commerce access token
//!
//! The commerce API hands out short-lived bearer tokens. Fetching one per
//! request would double the HTTP traffic of every handler, so the client
//! keeps the current token in a single-slot TTL cache and only re-fetches
//! once the slot expires.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use storefront_bot::cache::TokenCache;
//! use std::time::Duration;
//!
//! let cache = TokenCache::new();
//! cache.store("token".to_string(), Duration::from_secs(3600));
//! assert_eq!(cache.get(), Some("token".to_string()));
//! ```

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct StoredToken {
    token: String,
    deadline: Instant,
}

impl StoredToken {
    fn fresh(&self) -> bool {
        Instant::now() < self.deadline
    }
}

/// Thread-safe single-slot cache for the current bearer token.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<StoredToken>>,
}

impl TokenCache {
    /// Create an empty token cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached token if one is present and still fresh
    pub fn get(&self) -> Option<String> {
        self.slot
            .lock()
            .as_ref()
            .filter(|stored| stored.fresh())
            .map(|stored| stored.token.clone())
    }

    /// Replace the cached token
    pub fn store(&self, token: String, ttl: Duration) {
        *self.slot.lock() = Some(StoredToken {
            token,
            deadline: Instant::now() + ttl,
        });
    }

    /// Drop the cached token so the next call re-authenticates
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}
