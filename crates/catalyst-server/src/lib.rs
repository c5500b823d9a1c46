pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::any;
use axum::Router;
use catalyst_core::Engine;
use tower_http::trace::TraceLayer;

/// Build the axum Router with the webhook ingress and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let app_state = state::AppState::new(engine);

    Router::new()
        .route("/reaction/", any(routes::reaction::handle))
        .route("/reaction/{*path}", any(routes::reaction::handle))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the server on `addr` and run until `shutdown` resolves.
pub async fn serve(
    engine: Arc<Engine>,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(engine, listener, shutdown).await
}

/// Start the server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when port 0 lets
/// the OS pick a free port).
pub async fn serve_on(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(engine);

    tracing::info!("catalyst listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
