//! Error types for the dispatch domain.
//!
//! Each stage of the pipeline has its own error enum. None of them ever
//! escapes a request: [`crate::HookPipeline`] folds every failure into a
//! [`crate::DispatchOutcome`] after logging it. [`ConfigError`] is the only
//! error that can stop the receiver, and only at startup.
//!
//! No variant carries a configured secret.

use std::time::Duration;

use thiserror::Error;

use crate::ProjectId;

// ---------------------------------------------------------------------------
// Configuration loading
// ---------------------------------------------------------------------------

/// Errors raised while loading the configuration document.
///
/// Missing `command` or `secret` fields are *not* errors: such entries load as
/// incomplete and are reported, see [`crate::config::ConfigEntry`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML (or JSON).
    #[error("configuration document is not valid YAML: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// The document's top level is not a mapping of project id to entry.
    #[error("configuration document must be a mapping of project id to entry")]
    NotAMapping,

    /// A top-level key is not a non-empty string.
    #[error("configuration key {key} is not a non-empty string")]
    InvalidProjectKey {
        /// Debug rendering of the offending key.
        key: String,
    },

    /// An entry has the wrong shape (e.g. `background` is not a boolean).
    #[error("entry for project {project} is malformed: {reason}")]
    InvalidEntry {
        /// Project the entry belongs to.
        project: ProjectId,
        /// What was wrong with it.
        reason: String,
    },

    /// A string `command` could not be split into words.
    #[error("command for project {project} cannot be split into arguments: {reason}")]
    InvalidCommand {
        /// Project the command belongs to.
        project: ProjectId,
        /// Tokenizer error message.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

/// Errors raised while turning an inbound request into an
/// [`crate::InboundRequest`]. All of them map to a malformed-payload outcome.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The request has no `Content-Length` header.
    #[error("request has no Content-Length header")]
    MissingContentLength,

    /// `Content-Length` is not a decimal byte count.
    #[error("Content-Length {value:?} is not a byte count")]
    InvalidContentLength {
        /// Raw header value.
        value: String,
    },

    /// The body size disagrees with `Content-Length`.
    #[error("body is {actual} bytes but Content-Length declared {declared}")]
    LengthMismatch {
        /// Declared length.
        declared: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// The body is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A key along the project path is absent.
    #[error("payload has no project at {path}: key {segment:?} is missing")]
    MissingProjectField {
        /// The full configured path.
        path: String,
        /// The first segment that could not be found.
        segment: String,
    },

    /// The value at the project path is not a non-empty string.
    #[error("payload value at {path} is not a non-empty string")]
    InvalidProjectValue {
        /// The full configured path.
        path: String,
    },
}

// ---------------------------------------------------------------------------
// Configuration lookup
// ---------------------------------------------------------------------------

/// Why a project could not be resolved to a dispatchable entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No entry exists for the project.
    #[error("project {project} is not configured")]
    NotConfigured {
        /// The requested project.
        project: ProjectId,
    },

    /// An entry exists but lacks a required field.
    #[error("project {project} is missing required key {field}")]
    Incomplete {
        /// The requested project.
        project: ProjectId,
        /// The first missing field (`command` or `secret`).
        field: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Command launch
// ---------------------------------------------------------------------------

/// Errors raised by a [`crate::CommandLauncher`].
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The process could not be started (not found, permission denied, ...).
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was being executed.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting for a foreground process failed.
    #[error("failed to wait for {program}: {source}")]
    Wait {
        /// Program that was being waited on.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A foreground process exceeded its time limit and was killed.
    #[error("{program} did not exit within {}s and was killed", .after.as_secs())]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// The limit that was exceeded.
        after: Duration,
    },
}
