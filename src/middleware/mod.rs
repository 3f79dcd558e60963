pub mod auth;
pub mod gate;
pub mod rate_limit;

pub use auth::{AuthGate, AuthUser};
pub use gate::{run_gates, Flow, Gate, GateChain};
pub use rate_limit::RateLimitGate;
