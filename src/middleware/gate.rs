use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// What a gate decided about a request.
pub enum Flow {
    Continue,
    Halt(Response),
}

/// One step in front of a handler. Gates may annotate the request (extensions)
/// before letting it through.
#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, req: &mut Request<Body>) -> Flow;
}

/// Ordered list of gates run before the inner service.
#[derive(Clone)]
pub struct GateChain {
    gates: Arc<[Arc<dyn Gate>]>,
}

impl GateChain {
    pub fn new(gates: Vec<Arc<dyn Gate>>) -> Self {
        Self {
            gates: gates.into(),
        }
    }

    pub fn single(gate: Arc<dyn Gate>) -> Self {
        Self::new(vec![gate])
    }
}

/// Runs the chain in order; the first `Halt` becomes the response.
pub async fn run_gates(
    State(chain): State<GateChain>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    for gate in chain.gates.iter() {
        if let Flow::Halt(response) = gate.check(&mut req).await {
            tracing::debug!(
                "{} halted {} {} with {}",
                gate.name(),
                req.method(),
                req.uri().path(),
                response.status()
            );
            return response;
        }
    }

    next.run(req).await
}
