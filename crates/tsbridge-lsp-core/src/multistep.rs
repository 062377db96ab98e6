//! Cancellable multi-step operations.
//!
//! A [`MultistepOperation`] is a unit of background work that runs in short
//! steps. Each step may schedule at most one immediate continuation and at
//! most one delayed continuation through [`NextStep`]; scheduling another of
//! the same kind replaces the earlier one. The operation owns one request id
//! for its whole lifetime and reports completion to its host exactly once.
//!
//! ```text
//!   start_new ──► Running ──► (continuation scheduled) ──► Suspended
//!                    ▲                                        │
//!                    └──────────── run_pending ◄──────────────┘
//!                    │
//!                    └── nothing scheduled / error / cancelled ──► Complete
//! ```
//!
//! The operation never spawns or sleeps on its own. A driver asks for
//! [`MultistepOperation::next_deadline`], waits, then calls
//! [`MultistepOperation::run_pending`].

use std::fmt;
use std::time::{Duration, Instant};

use crate::engine::{EngineError, EngineResult};
use crate::request::{CancellationToken, RequestId, RequestScope, SharedCancellationToken};

/// The state a multi-step operation runs against.
pub trait OperationHost {
    /// Allocate the id for a new operation.
    fn next_request_id(&mut self) -> RequestId;

    /// The operation that owned `request` finished.
    fn request_completed(&mut self, request: RequestId);

    fn cancellation_token(&self) -> SharedCancellationToken;

    fn log_error(&mut self, request: RequestId, error: &EngineError) {
        tracing::error!(request_id = %request, %error, "multistep operation failed");
    }
}

/// A single step of an operation.
pub type Step<H> = Box<dyn FnOnce(&mut H, &mut NextStep<H>) -> EngineResult<()> + Send>;

/// Collects the continuations a step asks for.
pub struct NextStep<H> {
    immediate: Option<Step<H>>,
    delayed: Option<(Duration, Step<H>)>,
}

impl<H> NextStep<H> {
    fn new() -> Self {
        Self {
            immediate: None,
            delayed: None,
        }
    }

    /// Continue as soon as the driver gets control back.
    pub fn immediate<F>(&mut self, step: F)
    where
        F: FnOnce(&mut H, &mut NextStep<H>) -> EngineResult<()> + Send + 'static,
    {
        self.immediate = Some(Box::new(step));
    }

    /// Continue once `after` has elapsed.
    pub fn delay<F>(&mut self, after: Duration, step: F)
    where
        F: FnOnce(&mut H, &mut NextStep<H>) -> EngineResult<()> + Send + 'static,
    {
        self.delayed = Some((after, Box::new(step)));
    }
}

/// A suspended-and-resumed unit of background work. See the module docs.
pub struct MultistepOperation<H> {
    request: Option<RequestId>,
    immediate: Option<(Instant, Step<H>)>,
    timer: Option<(Instant, Step<H>)>,
}

impl<H> Default for MultistepOperation<H> {
    fn default() -> Self {
        Self {
            request: None,
            immediate: None,
            timer: None,
        }
    }
}

impl<H> fmt::Debug for MultistepOperation<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultistepOperation")
            .field("request", &self.request)
            .field("immediate", &self.immediate.as_ref().map(|(at, _)| at))
            .field("timer", &self.timer.as_ref().map(|(at, _)| at))
            .finish()
    }
}

impl<H: OperationHost> MultistepOperation<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the live operation, if any.
    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    pub fn has_pending_work(&self) -> bool {
        self.immediate.is_some() || self.timer.is_some()
    }

    /// When the driver should next call [`run_pending`](Self::run_pending).
    pub fn next_deadline(&self) -> Option<Instant> {
        let immediate = self.immediate.as_ref().map(|(at, _)| *at);
        let timer = self.timer.as_ref().map(|(at, _)| *at);
        match (immediate, timer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Complete the current operation, if any, and start a new one with
    /// `action` as its first step.
    pub fn start_new<F>(&mut self, host: &mut H, now: Instant, action: F)
    where
        F: FnOnce(&mut H, &mut NextStep<H>) -> EngineResult<()> + Send + 'static,
    {
        self.complete(host);
        self.request = Some(host.next_request_id());
        self.execute(host, now, Box::new(action));
    }

    /// Run one due continuation. Immediate continuations go first.
    ///
    /// Returns whether a step ran.
    pub fn run_pending(&mut self, host: &mut H, now: Instant) -> bool {
        if let Some((_, step)) = self.immediate.take() {
            self.execute(host, now, step);
            return true;
        }
        match self.timer.take() {
            Some((deadline, step)) if deadline <= now => {
                self.execute(host, now, step);
                true
            }
            pending => {
                self.timer = pending;
                false
            }
        }
    }

    /// Finish the live operation: report completion and drop its pending
    /// continuations. A no-op when nothing is live.
    pub fn complete(&mut self, host: &mut H) {
        if let Some(request) = self.request.take() {
            host.request_completed(request);
        }
        self.immediate = None;
        self.timer = None;
    }

    fn execute(&mut self, host: &mut H, now: Instant, step: Step<H>) {
        let Some(request) = self.request else {
            return;
        };

        let token = host.cancellation_token();
        let stop = {
            let _scope = RequestScope::enter(token.as_ref(), request);
            if token.is_cancellation_requested() {
                true
            } else {
                let mut next = NextStep::new();
                match step(host, &mut next) {
                    Ok(()) => {
                        self.schedule(next, now);
                        false
                    }
                    Err(error) => {
                        if !error.is_cancelled() {
                            host.log_error(request, &error);
                        }
                        true
                    }
                }
            }
        };

        if stop || !self.has_pending_work() {
            self.complete(host);
        }
    }

    fn schedule(&mut self, next: NextStep<H>, now: Instant) {
        if let Some(step) = next.immediate {
            self.immediate = Some((now, step));
        }
        if let Some((after, step)) = next.delayed {
            self.timer = Some((now + after, step));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FlagToken {
        cancelled: AtomicBool,
        current: std::sync::Mutex<Option<RequestId>>,
    }

    impl CancellationToken for FlagToken {
        fn set_request(&self, request: RequestId) {
            *self.current.lock().unwrap() = Some(request);
        }

        fn reset_request(&self, _request: RequestId) {
            *self.current.lock().unwrap() = None;
        }

        fn is_cancellation_requested(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct TestHost {
        next_id: u64,
        completed: Vec<RequestId>,
        errors: Vec<String>,
        ran: Vec<&'static str>,
        token: Arc<FlagToken>,
    }

    impl OperationHost for TestHost {
        fn next_request_id(&mut self) -> RequestId {
            self.next_id += 1;
            RequestId(self.next_id)
        }

        fn request_completed(&mut self, request: RequestId) {
            self.completed.push(request);
        }

        fn cancellation_token(&self) -> SharedCancellationToken {
            self.token.clone()
        }

        fn log_error(&mut self, _request: RequestId, error: &EngineError) {
            self.errors.push(error.to_string());
        }
    }

    type Op = MultistepOperation<TestHost>;

    #[test]
    fn test_single_step_completes_once() {
        let mut host = TestHost::default();
        let mut op = Op::new();
        let now = Instant::now();

        op.start_new(&mut host, now, |host, _next| {
            host.ran.push("first");
            Ok(())
        });

        assert_eq!(host.ran, vec!["first"]);
        assert_eq!(host.completed, vec![RequestId(1)]);
        assert!(op.request().is_none());

        op.complete(&mut host);
        assert_eq!(host.completed.len(), 1);
    }

    #[test]
    fn test_request_id_is_current_while_step_runs() {
        let mut host = TestHost::default();
        let mut op = Op::new();

        op.start_new(&mut host, Instant::now(), |host, _next| {
            assert_eq!(*host.token.current.lock().unwrap(), Some(RequestId(1)));
            Ok(())
        });

        assert_eq!(*host.token.current.lock().unwrap(), None);
    }

    #[test]
    fn test_delayed_step_waits_for_deadline() {
        let mut host = TestHost::default();
        let mut op = Op::new();
        let now = Instant::now();

        op.start_new(&mut host, now, |_host, next| {
            next.delay(Duration::from_millis(200), |host, _next| {
                host.ran.push("delayed");
                Ok(())
            });
            Ok(())
        });

        assert_eq!(op.next_deadline(), Some(now + Duration::from_millis(200)));
        assert!(!op.run_pending(&mut host, now + Duration::from_millis(199)));
        assert!(host.ran.is_empty());
        assert!(host.completed.is_empty());

        assert!(op.run_pending(&mut host, now + Duration::from_millis(200)));
        assert_eq!(host.ran, vec!["delayed"]);
        assert_eq!(host.completed, vec![RequestId(1)]);
    }

    #[test]
    fn test_start_new_completes_previous_and_drops_its_steps() {
        let mut host = TestHost::default();
        let mut op = Op::new();
        let now = Instant::now();

        op.start_new(&mut host, now, |_host, next| {
            next.delay(Duration::from_millis(10), |host, _next| {
                host.ran.push("stale");
                Ok(())
            });
            Ok(())
        });
        op.start_new(&mut host, now, |_host, next| {
            next.delay(Duration::from_millis(10), |host, _next| {
                host.ran.push("fresh");
                Ok(())
            });
            Ok(())
        });

        assert_eq!(host.completed, vec![RequestId(1)]);
        while op.run_pending(&mut host, now + Duration::from_secs(1)) {}
        assert_eq!(host.ran, vec!["fresh"]);
        assert_eq!(host.completed, vec![RequestId(1), RequestId(2)]);
    }

    #[test]
    fn test_scheduling_same_kind_replaces_previous() {
        let mut host = TestHost::default();
        let mut op = Op::new();
        let now = Instant::now();

        op.start_new(&mut host, now, |_host, next| {
            next.immediate(|host, _next| {
                host.ran.push("replaced");
                Ok(())
            });
            next.immediate(|host, _next| {
                host.ran.push("kept");
                Ok(())
            });
            Ok(())
        });

        while op.run_pending(&mut host, now) {}
        assert_eq!(host.ran, vec!["kept"]);
    }

    #[test]
    fn test_immediate_runs_before_timer() {
        let mut host = TestHost::default();
        let mut op = Op::new();
        let now = Instant::now();

        op.start_new(&mut host, now, |_host, next| {
            next.delay(Duration::ZERO, |host, _next| {
                host.ran.push("timer");
                Ok(())
            });
            next.immediate(|host, _next| {
                host.ran.push("immediate");
                Ok(())
            });
            Ok(())
        });

        while op.run_pending(&mut host, now) {}
        assert_eq!(host.ran, vec!["immediate", "timer"]);
        assert_eq!(host.completed, vec![RequestId(1)]);
    }

    #[test]
    fn test_cancellation_stops_operation() {
        let mut host = TestHost::default();
        let mut op = Op::new();
        let now = Instant::now();

        op.start_new(&mut host, now, |_host, next| {
            next.immediate(|host, _next| {
                host.ran.push("after cancel");
                Ok(())
            });
            Ok(())
        });
        host.token.cancelled.store(true, Ordering::SeqCst);

        assert!(op.run_pending(&mut host, now));
        assert!(host.ran.is_empty());
        assert_eq!(host.completed, vec![RequestId(1)]);
        assert!(!op.has_pending_work());
    }

    #[test]
    fn test_error_is_logged_and_completes() {
        let mut host = TestHost::default();
        let mut op = Op::new();

        op.start_new(&mut host, Instant::now(), |_host, next| {
            next.immediate(|_host, _next| Ok(()));
            Err(EngineError::Failed("boom".to_string()))
        });

        assert_eq!(host.errors, vec!["boom"]);
        assert_eq!(host.completed, vec![RequestId(1)]);
        assert!(!op.has_pending_work());
    }

    #[test]
    fn test_engine_cancellation_is_not_logged() {
        let mut host = TestHost::default();
        let mut op = Op::new();

        op.start_new(&mut host, Instant::now(), |_host, _next| {
            Err(EngineError::Cancelled)
        });

        assert!(host.errors.is_empty());
        assert_eq!(host.completed, vec![RequestId(1)]);
    }
}
