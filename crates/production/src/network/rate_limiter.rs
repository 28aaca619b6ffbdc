//! Per-sender rate limiting for inbound envelopes.
//!
//! Token bucket per signing key. Roster members get a budget sized for a
//! full round of traffic; keys outside the roster get a small one so that
//! handshakes still land but floods do not reach signature verification.

use pulsar_types::PublicKey;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Envelopes per second allowed from roster members.
    pub roster_per_sec: u32,
    /// Bucket capacity for roster members.
    pub roster_burst: u32,
    /// Envelopes per second allowed from keys outside the roster.
    pub unknown_per_sec: u32,
    /// Bucket capacity for keys outside the roster.
    pub unknown_burst: u32,
    /// How long to track a sender after its last envelope.
    pub peer_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // A round costs each member a commit, a reveal, an optional
            // vector and an announce.
            roster_per_sec: 50,
            roster_burst: 100,
            unknown_per_sec: 2,
            unknown_burst: 5,
            peer_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: u32) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            last_update: Instant::now(),
        }
    }

    /// Try to consume one token. Returns true if allowed.
    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.last_update.elapsed() > ttl
    }
}

/// Per-sender rate limiter using token buckets.
pub struct InboundRateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<PublicKey, TokenBucket>,
    last_cleanup: Instant,
}

impl InboundRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
            last_cleanup: Instant::now(),
        }
    }

    /// Check whether an envelope signed by `sender` should be processed.
    ///
    /// The bucket is sized on first sight of the key; a sender later added
    /// to the roster keeps its small bucket until it goes stale.
    pub fn check(&mut self, sender: &PublicKey, is_roster_member: bool) -> bool {
        if self.last_cleanup.elapsed() > Duration::from_secs(60) {
            self.cleanup();
        }

        let config = &self.config;
        let bucket = self.buckets.entry(sender.clone()).or_insert_with(|| {
            if is_roster_member {
                TokenBucket::new(config.roster_burst, config.roster_per_sec)
            } else {
                TokenBucket::new(config.unknown_burst, config.unknown_per_sec)
            }
        });

        bucket.try_consume()
    }

    fn cleanup(&mut self) {
        let ttl = self.config.peer_ttl;
        self.buckets.retain(|_, bucket| !bucket.is_stale(ttl));
        self.last_cleanup = Instant::now();
    }

    /// Number of senders currently tracked.
    pub fn tracked_senders(&self) -> usize {
        self.buckets.len()
    }
}
