//! Core dispatch domain for the webhook receiver.
//!
//! This crate contains every domain concept of the receiver: the project
//! configuration store, request parsing, token authentication, the outcome
//! taxonomy, and the [`HookPipeline`] that sequences them. Infrastructure
//! crates implement the [`CommandLauncher`] port and carry HTTP; they never
//! add dispatch rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ProjectId`, `RequestId`) |
//! | [`types`] | Value types (`CommandLine`, `SecretToken`, `HookConvention`, etc.) |
//! | [`errors`] | Per-stage error types |
//! | [`config`] | `ConfigStore` and `ProjectEntry` |
//! | [`request`] | `RequestParser` and `InboundRequest` |
//! | [`auth`] | Constant-time token check |
//! | [`launch`] | `CommandLauncher` port |
//! | [`outcome`] | `DispatchOutcome` |
//! | [`hook`] | `HookPipeline` |

pub mod auth;
pub mod config;
pub mod errors;
pub mod hook;
pub mod identifiers;
pub mod launch;
pub mod outcome;
pub mod request;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use auth::authenticate;
pub use config::{ConfigEntry, ConfigStore, ProjectEntry};
pub use errors::{ConfigError, LaunchError, LookupError, ParseError};
pub use hook::HookPipeline;
pub use identifiers::{ProjectId, RequestId};
pub use launch::{CommandLauncher, LaunchReport};
pub use outcome::DispatchOutcome;
pub use request::{FieldLookup, InboundRequest, RequestHeaders, RequestParser};
pub use types::{CommandLine, ExecutionMode, HookConvention, ProjectPath, SecretToken};
