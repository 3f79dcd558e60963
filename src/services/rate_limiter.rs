use async_trait::async_trait;
use dashmap::DashMap;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis error: {0}")]
    Redis(String),
}

/// Outcome of counting one request against a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

impl Decision {
    fn from_count(count: u64, limit: u32, reset_after: Duration) -> Self {
        Self {
            allowed: count <= u64::from(limit),
            limit,
            remaining: u64::from(limit).saturating_sub(count) as u32,
            reset_after,
        }
    }
}

/// Shared per-client counters. `hit` counts the request and reports whether it
/// fits in the client's window; increments for one key must be atomic.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str) -> Result<Decision, RateLimitError>;
}

struct Window {
    started: Instant,
    count: u64,
}

/// In-process fixed-window limiter.
#[derive(Clone)]
pub struct MemoryRateLimiter {
    windows: Arc<DashMap<String, Window>>,
    config: RateLimitConfig,
}

impl MemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            config,
        }
    }

    fn count(&self, key: &str) -> Decision {
        let now = Instant::now();
        // The entry guard holds the shard lock until the count is read back.
        let mut window = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.config.window {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;

        let reset_after = self.config.window - now.duration_since(window.started);
        Decision::from_count(window.count, self.config.max_requests, reset_after)
    }

    /// Drops windows that have already closed.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Sweeps once per window until the process exits.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.config.window);
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.sweep();
                tracing::debug!("Rate limiter tracking {} clients", limiter.tracked_clients());
            }
        })
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn hit(&self, key: &str) -> Result<Decision, RateLimitError> {
        Ok(self.count(key))
    }
}

/// Distributed fixed-window limiter backed by Redis `INCR`/`TTL`/`EXPIRE`.
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: Client,
    connection: Arc<Mutex<Option<redis::aio::MultiplexedConnection>>>,
    config: RateLimitConfig,
}

impl RedisRateLimiter {
    pub fn new(redis_url: &str, config: RateLimitConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(redis_url)
            .map_err(|e| RateLimitError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            config,
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, RateLimitError> {
        let mut conn_guard = self.connection.lock().await;

        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RateLimitError::Connection(e.to_string()))?;

        *conn_guard = Some(conn.clone());
        Ok(conn)
    }
}

/// Reads the result of `INCR` + `TTL` on a window key.
///
/// A negative TTL means the key has no expiry yet, either because this hit
/// created it or because an earlier `EXPIRE` never landed; the bool tells the
/// caller to (re)arm it so the window can close.
fn redis_window(count: u64, ttl: i64, config: &RateLimitConfig) -> (Decision, bool) {
    let needs_expiry = ttl < 0;
    let reset_after = if needs_expiry {
        config.window
    } else {
        Duration::from_secs(ttl as u64)
    };

    (
        Decision::from_count(count, config.max_requests, reset_after),
        needs_expiry,
    )
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn hit(&self, key: &str) -> Result<Decision, RateLimitError> {
        let key = format!("rate_limit:users:{}", key);
        let window_seconds = self.config.window.as_secs().max(1) as i64;

        let mut conn = self.get_connection().await?;

        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .ttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Redis(e.to_string()))?;

        let (decision, needs_expiry) = redis_window(count, ttl, &self.config);
        if needs_expiry {
            let _: () = conn
                .expire(&key, window_seconds)
                .await
                .map_err(|e| RateLimitError::Redis(e.to_string()))?;
        }

        Ok(decision)
    }
}
