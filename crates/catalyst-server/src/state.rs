use std::sync::Arc;

use catalyst_core::Engine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Upper bound for buffered webhook request bodies.
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let max_body_bytes = engine.config().max_body_bytes;
        Self {
            engine,
            max_body_bytes,
        }
    }
}
