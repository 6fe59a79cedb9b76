//! The dispatch pipeline: parse → lookup → authenticate → launch.
//!
//! [`HookPipeline::handle`] is the only entry point the transport needs. Every
//! stage failure is logged here, with the project id when it is known, and
//! folded into a [`DispatchOutcome`]; nothing propagates to the caller and
//! nothing can take the receiver down.
//!
//! The launcher is reached only after authentication succeeds.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::authenticate;
use crate::{
    CommandLauncher, ConfigStore, DispatchOutcome, LaunchError, LaunchReport, RequestHeaders,
    RequestParser,
};

/// Processes webhook deliveries against an immutable configuration.
///
/// Cheap to share: the transport holds one instance behind an `Arc` and calls
/// [`handle`](Self::handle) concurrently from every request task.
pub struct HookPipeline {
    store: Arc<ConfigStore>,
    parser: RequestParser,
    launcher: Arc<dyn CommandLauncher>,
}

impl HookPipeline {
    /// Creates a pipeline from its collaborators.
    pub fn new(
        store: Arc<ConfigStore>,
        parser: RequestParser,
        launcher: Arc<dyn CommandLauncher>,
    ) -> Self {
        Self {
            store,
            parser,
            launcher,
        }
    }

    /// Processes one delivery.
    ///
    /// If the current span declares a `project` field, it is filled in once
    /// the project id has been parsed.
    pub async fn handle(&self, headers: &RequestHeaders, body: Vec<u8>) -> DispatchOutcome {
        let request = match self.parser.parse(headers, body) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejecting malformed webhook");
                return DispatchOutcome::MalformedPayload;
            }
        };

        let project = request.project();
        tracing::Span::current().record("project", project.as_str());

        let entry = match self.store.lookup(project) {
            Ok(entry) => entry,
            Err(err) => {
                error!(%project, error = %err, "no dispatchable configuration");
                return DispatchOutcome::ProjectNotConfigured;
            }
        };

        if !authenticate(&request, entry) {
            warn!(
                %project,
                token_present = request.token().is_some(),
                "webhook token not authorized"
            );
            return DispatchOutcome::AuthFailure;
        }

        info!(
            %project,
            command = %entry.command(),
            mode = entry.mode().as_str(),
            "launching command"
        );
        match self
            .launcher
            .launch(project, entry, request.raw_payload())
            .await
        {
            Ok(LaunchReport::Completed { exit_code }) => {
                match exit_code {
                    Some(0) => info!(%project, "command completed"),
                    Some(code) => warn!(%project, exit_code = code, "command exited with failure"),
                    None => warn!(%project, "command terminated by signal"),
                }
                DispatchOutcome::Success
            }
            Ok(LaunchReport::Detached { pid }) => {
                info!(%project, pid, "command running in background");
                DispatchOutcome::Success
            }
            Err(err @ LaunchError::TimedOut { .. }) => {
                error!(%project, error = %err, "command timed out");
                DispatchOutcome::CommandTimedOut
            }
            Err(err) => {
                error!(%project, error = %err, "command could not run");
                DispatchOutcome::LaunchFailure
            }
        }
    }
}
