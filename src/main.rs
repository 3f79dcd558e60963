use axum::{extract::Request, ServiceExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use user_service::config::Config;
use user_service::db::{self, LibsqlStore, MemoryStore, UserStore};
use user_service::routes::{create_router, AppState, USERS_PREFIX};
use user_service::services::{MemoryRateLimiter, RateLimitStore, RedisRateLimiter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "user_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| format!("JWT_SECRET: {}", e))?;

    let users: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => {
            let database = db::create_database(url, config.turso_auth_token.as_deref()).await?;
            let store = LibsqlStore::open(database).await?;
            tracing::info!("Connected to database");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - users are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let rate_limiter: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => match RedisRateLimiter::new(url, config.rate_limit) {
            Ok(limiter) => {
                tracing::info!("Redis rate limiter configured");
                Arc::new(limiter)
            }
            Err(e) => {
                tracing::error!("Failed to initialize Redis rate limiter: {} - using in-memory counters", e);
                memory_limiter(&config)
            }
        },
        None => memory_limiter(&config),
    };

    tracing::info!(
        "Rate limit: {} requests per {}s per client",
        config.rate_limit.max_requests,
        config.rate_limit.window.as_secs()
    );

    let state = AppState {
        config: config.clone(),
        users,
        rate_limiter,
    };

    let app = NormalizePathLayer::trim_trailing_slash().layer(create_router(state));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Users API mounted at {}", USERS_PREFIX);

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .await?;

    Ok(())
}

fn memory_limiter(config: &Config) -> Arc<dyn RateLimitStore> {
    let limiter = MemoryRateLimiter::new(config.rate_limit);
    limiter.spawn_sweeper();
    tracing::info!("In-memory rate limiter configured");
    Arc::new(limiter)
}
