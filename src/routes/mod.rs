pub mod users;

use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::UserStore;
use crate::middleware::{AuthGate, GateChain, RateLimitGate};
use crate::services::RateLimitStore;

pub const USERS_PREFIX: &str = "/api/users";
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub rate_limiter: Arc<dyn RateLimitStore>,
}

/// The two chains the users table is built from.
#[derive(Clone)]
pub struct UserGates {
    /// Runs for every request entering the users router.
    pub rate_limit: GateChain,
    /// Runs for routes marked `Access::Authenticated`.
    pub authenticate: GateChain,
}

impl UserGates {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            rate_limit: GateChain::single(Arc::new(RateLimitGate::new(state.rate_limiter.clone()))),
            authenticate: GateChain::single(Arc::new(AuthGate::new(&state.config.jwt_secret))),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let gates = UserGates::from_state(&state);
    build_router(state, gates)
}

pub fn build_router(state: AppState, gates: UserGates) -> Router {
    Router::new()
        .nest(USERS_PREFIX, users::routes(gates))
        .route(OPENAPI_PATH, get(|| async { Json(users::openapi()) }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
