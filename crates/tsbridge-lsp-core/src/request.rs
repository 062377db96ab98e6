//! Request identity and cooperative cancellation.

use std::fmt;
use std::sync::Arc;

/// Identity of a unit of server-side work, allocated by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared cancellation flag consulted by the engine and the scheduler.
///
/// The session sets the current request before running engine work and
/// resets it afterwards. Implementations decide how a request comes to be
/// cancelled (a client notification, a pipe, a timeout).
pub trait CancellationToken: Send + Sync {
    fn set_request(&self, request: RequestId);

    fn reset_request(&self, request: RequestId);

    fn is_cancellation_requested(&self) -> bool;
}

/// A token that never reports cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCancellationToken;

impl CancellationToken for NullCancellationToken {
    fn set_request(&self, _request: RequestId) {}

    fn reset_request(&self, _request: RequestId) {}

    fn is_cancellation_requested(&self) -> bool {
        false
    }
}

/// Shared handle to a cancellation token.
pub type SharedCancellationToken = Arc<dyn CancellationToken>;

/// Marks `request` as current on `token` until dropped.
///
/// Resetting on drop keeps the token consistent when the guarded work
/// returns early through `?`.
pub struct RequestScope<'a> {
    token: &'a dyn CancellationToken,
    request: RequestId,
}

impl<'a> RequestScope<'a> {
    pub fn enter(token: &'a dyn CancellationToken, request: RequestId) -> Self {
        token.set_request(request);
        Self { token, request }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        self.token.reset_request(self.request);
    }
}
