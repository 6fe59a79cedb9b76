//! Webhook receiver HTTP transport.
//!
//! Binds the [`pipeline::HookPipeline`] to an axum router. Every `POST`,
//! whatever its path, is one webhook delivery:
//!
//! 1. A request span is opened with a fresh [`pipeline::RequestId`].
//! 2. The body is read up to the configured cap.
//! 3. The pipeline runs on its own task and yields a
//!    [`pipeline::DispatchOutcome`].
//! 4. [`status_for`] turns the outcome into an empty-bodied response.
//!
//! ## Status Codes
//!
//! | Outcome | Status |
//! |---------|--------|
//! | `Success` | 200 |
//! | `AuthFailure` | 401 |
//! | `ProjectNotConfigured` | 500 |
//! | `MalformedPayload` | 500 |
//! | `LaunchFailure` | 500 |
//! | `CommandTimedOut` | 500 |
//!
//! ## Concurrency
//!
//! axum serves each connection on its own tokio task, so a foreground command
//! holds up only the request that launched it. The only state shared between
//! requests is the immutable configuration store.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP framing, body limits, and status codes all live
//! here. The [`pipeline`] crate sees only [`pipeline::RequestHeaders`] and the
//! body bytes.

mod handler;
mod response;
mod server;

pub use handler::{ReceiverState, DEFAULT_MAX_BODY_BYTES};
pub use response::status_for;
pub use server::{router, serve, ListenerError};
