pub mod rate_limiter;

pub use rate_limiter::{
    Decision, MemoryRateLimiter, RateLimitError, RateLimitStore, RedisRateLimiter,
};
