//! Router construction and the serve loop.

use std::future::Future;

use axum::routing::post;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::handler::{receive, ReceiverState};

/// Errors that stop the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The HTTP server failed while accepting or serving connections.
    #[error("webhook listener failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Builds the receiver's router: `POST` on every path goes to the webhook
/// handler; other methods get `405 Method Not Allowed`.
pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/*path", post(receive))
        .with_state(state)
}

/// Serves webhooks on `listener` until `shutdown` resolves.
///
/// In-flight requests (including foreground commands) are allowed to finish
/// after shutdown is signalled.
pub async fn serve<F>(
    listener: TcpListener,
    state: ReceiverState,
    shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(listen = %addr, "webhook receiver listening");
    }
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve)
}
