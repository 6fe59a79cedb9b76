//! The result of processing one webhook delivery.

/// Tagged result of the dispatch pipeline.
///
/// Produced by [`crate::HookPipeline::handle`] and consumed only by the
/// transport, which maps it to a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// The command was spawned (and, in foreground mode, has exited).
    Success,
    /// The presented token was missing or did not match.
    AuthFailure,
    /// The project is unknown or its entry is incomplete.
    ProjectNotConfigured,
    /// The body, a required header, or the project path was missing or invalid.
    MalformedPayload,
    /// The command could not be spawned or waited on.
    LaunchFailure,
    /// A foreground command exceeded its time limit and was killed.
    CommandTimedOut,
}

impl DispatchOutcome {
    /// Returns the outcome as a snake_case label for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AuthFailure => "auth_failure",
            Self::ProjectNotConfigured => "project_not_configured",
            Self::MalformedPayload => "malformed_payload",
            Self::LaunchFailure => "launch_failure",
            Self::CommandTimedOut => "command_timed_out",
        }
    }
}

impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
