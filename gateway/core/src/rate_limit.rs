//! Per-Client Rate Limiting
//!
//! Caps how many chat requests one client identity (usually an IP address)
//! may send inside a fixed time window. The check runs before the agent is
//! invoked; a rejection is final for that request and is never retried here.
//!
//! # Design
//!
//! Each client gets a fixed window:
//! - The window opens with the client's first request
//! - Every allowed request increments the window's counter
//! - Once the counter reaches `max_requests`, requests are rejected
//! - When `window_secs` have elapsed since the window opened, it resets
//!
//! Rejected requests do not count against the window.
//!
//! # Usage
//!
//! ```
//! use gateway_core::rate_limit::{ClientRateLimiter, RateLimitConfig};
//!
//! let limiter = ClientRateLimiter::new(RateLimitConfig::default());
//! assert!(limiter.check("203.0.113.7").is_allowed());
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for per-client rate limiting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client in one window
    pub max_requests: u32,

    /// Window length in seconds
    pub window_secs: u64,

    /// Whether to enforce the limit at all
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 2,
            window_secs: 60,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of requests allowed per window
    #[must_use]
    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests = max;
        self
    }

    /// Set the window length in seconds
    #[must_use]
    pub fn with_window_secs(mut self, secs: u64) -> Self {
        self.window_secs = secs;
        self
    }

    /// Enable or disable rate limiting
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Create a disabled configuration (for testing)
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Window length as a [`Duration`]
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors related to rate limiting
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// The client used up its allowance for the current window
    #[error("Rate limit exceeded for {client}: {limit} requests per {window_secs}s (retry in {retry_after_secs}s)")]
    RateLimitExceeded {
        /// Client identity that was rejected
        client: String,
        /// Requests allowed per window
        limit: u32,
        /// Window length in seconds
        window_secs: u64,
        /// Seconds until the window resets
        retry_after_secs: u64,
    },
}

/// Result of a rate limit check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request may proceed
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },

    /// Request must be refused
    Rejected {
        /// The reason for rejection
        error: RateLimitError,
    },
}

impl RateLimitResult {
    /// Check if the request is allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Check if the request was rejected
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Convert into a `Result`, keeping the remaining allowance
    ///
    /// # Errors
    ///
    /// Returns the [`RateLimitError`] carried by a rejection.
    pub fn into_result(self) -> Result<u32, RateLimitError> {
        match self {
            Self::Allowed { remaining } => Ok(remaining),
            Self::Rejected { error } => Err(error),
        }
    }
}

// =============================================================================
// Client Rate Limiter (Fixed Window)
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct Window {
    opened_at: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by client identity
///
/// Safe to share across request handlers; all bookkeeping sits behind one
/// lock so the counter for a client is updated atomically.
pub struct ClientRateLimiter {
    /// Configuration
    config: RateLimitConfig,

    /// Open window per client identity
    windows: RwLock<HashMap<String, Window>>,
}

impl ClientRateLimiter {
    /// Create a new client rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and count a request from `client`
    pub fn check(&self, client: &str) -> RateLimitResult {
        self.check_at(client, Instant::now())
    }

    /// Check and count a request from `client` as of `now`
    pub fn check_at(&self, client: &str, now: Instant) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let window_len = self.config.window();
        let mut windows = self.windows.write();
        let window = windows.entry(client.to_string()).or_insert(Window {
            opened_at: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(window.opened_at);
        if elapsed >= window_len {
            window.opened_at = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            let retry_after = window_len.saturating_sub(elapsed.min(window_len));
            tracing::info!(
                client = client,
                limit = self.config.max_requests,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            return RateLimitResult::Rejected {
                error: RateLimitError::RateLimitExceeded {
                    client: client.to_string(),
                    limit: self.config.max_requests,
                    window_secs: self.config.window_secs,
                    retry_after_secs: retry_after.as_secs().max(1),
                },
            };
        }

        window.count += 1;
        RateLimitResult::Allowed {
            remaining: self.config.max_requests - window.count,
        }
    }

    /// Requests counted for `client` in its current window
    #[must_use]
    pub fn request_count(&self, client: &str) -> u32 {
        self.windows.read().get(client).map_or(0, |w| w.count)
    }

    /// Number of clients with an open window
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.read().len()
    }

    /// Drop windows that have expired as of `now`
    pub fn purge_expired(&self, now: Instant) {
        let window_len = self.config.window();
        self.windows
            .write()
            .retain(|_, w| now.saturating_duration_since(w.opened_at) < window_len);
    }

    /// Forget all clients
    pub fn clear(&self) {
        self.windows.write().clear();
    }
}

impl std::fmt::Debug for ClientRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("config", &self.config)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

impl Default for ClientRateLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests, 2);
        assert_eq!(config.window_secs, 60);
        assert!(config.enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = RateLimitConfig::new()
            .with_max_requests(10)
            .with_window_secs(5)
            .with_enabled(false);

        assert_eq!(config.max_requests, 10);
        assert_eq!(config.window(), Duration::from_secs(5));
        assert!(!config.enabled);
    }

    #[test]
    fn test_config_disabled() {
        assert!(!RateLimitConfig::disabled().enabled);
    }

    // =========================================================================
    // RateLimitResult Tests
    // =========================================================================

    #[test]
    fn test_result_allowed() {
        let result = RateLimitResult::Allowed { remaining: 1 };
        assert!(result.is_allowed());
        assert!(!result.is_rejected());
        assert_eq!(result.into_result(), Ok(1));
    }

    #[test]
    fn test_result_rejected() {
        let error = RateLimitError::RateLimitExceeded {
            client: "a".to_string(),
            limit: 2,
            window_secs: 60,
            retry_after_secs: 12,
        };
        let result = RateLimitResult::Rejected {
            error: error.clone(),
        };
        assert!(!result.is_allowed());
        assert!(result.is_rejected());
        assert_eq!(result.into_result(), Err(error));
    }

    // =========================================================================
    // ClientRateLimiter Tests
    // =========================================================================

    #[test]
    fn test_third_request_in_window_rejected() {
        let limiter = ClientRateLimiter::with_defaults();
        let start = Instant::now();

        assert_eq!(
            limiter.check_at("10.0.0.1", start),
            RateLimitResult::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check_at("10.0.0.1", start + Duration::from_secs(10)),
            RateLimitResult::Allowed { remaining: 0 }
        );

        let third = limiter.check_at("10.0.0.1", start + Duration::from_secs(20));
        match third {
            RateLimitResult::Rejected {
                error:
                    RateLimitError::RateLimitExceeded {
                        limit,
                        retry_after_secs,
                        ..
                    },
            } => {
                assert_eq!(limit, 2);
                assert_eq!(retry_after_secs, 40);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_rejections_do_not_count() {
        let limiter = ClientRateLimiter::with_defaults();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.check_at("c", start);
        }
        assert_eq!(limiter.request_count("c"), 2);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = ClientRateLimiter::with_defaults();
        let start = Instant::now();

        assert!(limiter.check_at("c", start).is_allowed());
        assert!(limiter.check_at("c", start).is_allowed());
        assert!(limiter.check_at("c", start + Duration::from_secs(59)).is_rejected());
        assert!(limiter.check_at("c", start + Duration::from_secs(60)).is_allowed());
        assert_eq!(limiter.request_count("c"), 1);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = ClientRateLimiter::with_defaults();
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("a", now).is_rejected());
        assert!(limiter.check_at("b", now).is_allowed());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_disabled_never_rejects() {
        let limiter = ClientRateLimiter::new(RateLimitConfig::disabled());
        for _ in 0..100 {
            assert!(limiter.check("c").is_allowed());
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let limiter = ClientRateLimiter::with_defaults();
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("new", start + Duration::from_secs(50));
        limiter.purge_expired(start + Duration::from_secs(70));

        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.request_count("old"), 0);
        assert_eq!(limiter.request_count("new"), 1);
    }

    #[test]
    fn test_clear() {
        let limiter = ClientRateLimiter::with_defaults();
        limiter.check("a");
        limiter.check("b");
        limiter.clear();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_error_display() {
        let error = RateLimitError::RateLimitExceeded {
            client: "10.0.0.1".to_string(),
            limit: 2,
            window_secs: 60,
            retry_after_secs: 15,
        };
        let msg = error.to_string();
        assert!(msg.contains("10.0.0.1"));
        assert!(msg.contains("2 requests per 60s"));
    }

    #[test]
    fn test_limiter_thread_safe() {
        let limiter = Arc::new(ClientRateLimiter::new(
            RateLimitConfig::new().with_max_requests(50),
        ));
        let start = Instant::now();
        let mut handles = vec![];

        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                (0..10)
                    .filter(|_| limiter.check_at("shared", start).is_allowed())
                    .count()
            }));
        }

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
        assert_eq!(limiter.request_count("shared"), 50);
    }
}
