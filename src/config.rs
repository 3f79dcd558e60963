use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub turso_auth_token: Option<String>,
    pub redis_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

/// Fixed-window limit applied to every request entering the users router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = RateLimitConfig::default();

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            jwt_secret: env::var("JWT_SECRET")?,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            turso_auth_token: env::var("TURSO_AUTH_TOKEN").ok(),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            rate_limit: RateLimitConfig {
                window: env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.window),
                max_requests: env::var("RATE_LIMIT_MAX")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_requests),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_fifteen_minutes_of_one_hundred() {
        let limits = RateLimitConfig::default();
        assert_eq!(limits.window.as_millis(), 900_000);
        assert_eq!(limits.max_requests, 100);
    }
}
