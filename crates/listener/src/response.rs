//! Outcome → HTTP status mapping.

use axum::http::StatusCode;
use pipeline::DispatchOutcome;

/// Maps a dispatch outcome to the status sent to the hosting service.
///
/// Only an authentication failure is distinguished for the client; every other
/// failure is a plain 500 so the response reveals nothing about which project
/// ids are configured.
pub fn status_for(outcome: DispatchOutcome) -> StatusCode {
    match outcome {
        DispatchOutcome::Success => StatusCode::OK,
        DispatchOutcome::AuthFailure => StatusCode::UNAUTHORIZED,
        DispatchOutcome::ProjectNotConfigured
        | DispatchOutcome::MalformedPayload
        | DispatchOutcome::LaunchFailure
        | DispatchOutcome::CommandTimedOut => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        let table = [
            (DispatchOutcome::Success, 200),
            (DispatchOutcome::AuthFailure, 401),
            (DispatchOutcome::ProjectNotConfigured, 500),
            (DispatchOutcome::MalformedPayload, 500),
            (DispatchOutcome::LaunchFailure, 500),
            (DispatchOutcome::CommandTimedOut, 500),
        ];
        for (outcome, status) in table {
            assert_eq!(status_for(outcome).as_u16(), status, "{outcome}");
        }
    }
}
