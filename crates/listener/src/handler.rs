//! The webhook request handler.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use pipeline::{DispatchOutcome, HookPipeline, RequestHeaders, RequestId};
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::response::status_for;

/// Default cap on a webhook body (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct ReceiverState {
    pipeline: Arc<HookPipeline>,
    max_body_bytes: usize,
}

impl ReceiverState {
    /// Wraps a pipeline for sharing between request tasks.
    pub fn new(pipeline: HookPipeline, max_body_bytes: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            max_body_bytes,
        }
    }
}

/// Handles one `POST`, on any path.
///
/// The path plays no part in dispatch; it is only logged. The response never
/// has a body.
pub(crate) async fn receive(State(state): State<ReceiverState>, request: Request) -> StatusCode {
    let request_id = RequestId::new_random();
    let span = info_span!("webhook", %request_id, project = tracing::field::Empty);

    async move {
        let (parts, body) = request.into_parts();
        info!(path = parts.uri.path(), "hook received");

        let headers = request_headers(&parts.headers);
        let outcome = match axum::body::to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => dispatch(&state, headers, bytes.to_vec()).await,
            Err(err) => {
                warn!(error = %err, limit = state.max_body_bytes, "failed to read webhook body");
                DispatchOutcome::MalformedPayload
            }
        };

        let status = status_for(outcome);
        info!(%outcome, status = status.as_u16(), "hook processed");
        status
    }
    .instrument(span)
    .await
}

/// Runs the pipeline on its own task so a client that hangs up mid-request
/// does not cancel a foreground command.
async fn dispatch(state: &ReceiverState, headers: RequestHeaders, body: Vec<u8>) -> DispatchOutcome {
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::spawn(
        async move { pipeline.handle(&headers, body).await }.instrument(Span::current()),
    );
    match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "dispatch task failed");
            DispatchOutcome::LaunchFailure
        }
    }
}

/// Copies the headers the pipeline can read; values that are not visible
/// ASCII are dropped.
fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}
