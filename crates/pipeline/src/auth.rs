//! Token authentication.
//!
//! A request is authorized for a project when the token it presented equals
//! the project's configured secret. The comparison runs in constant time with
//! respect to the token contents so response timing does not reveal how much
//! of a guess was right.

use subtle::ConstantTimeEq;

use crate::{InboundRequest, ProjectEntry, SecretToken};

/// Returns `true` when `request` carries the secret configured for `entry`.
///
/// A request without a token is never authorized.
pub fn authenticate(request: &InboundRequest, entry: &ProjectEntry) -> bool {
    match request.token() {
        Some(presented) => tokens_match(presented, entry.secret()),
        None => false,
    }
}

fn tokens_match(presented: &SecretToken, expected: &SecretToken) -> bool {
    presented
        .expose()
        .as_bytes()
        .ct_eq(expected.expose().as_bytes())
        .into()
}
