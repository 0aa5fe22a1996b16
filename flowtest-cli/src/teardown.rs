//! Ordered teardown of acquired resources.
//!
//! Each acquired resource pushes a named guard; [`TeardownStack::unwind`] runs
//! them in reverse acquisition order. A guard's error is either surfaced as the
//! harness error or only logged, per its [`GuardPolicy`].

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error, warn};

use flowtest_core::error::FlowtestError;

type GuardFuture = Pin<Box<dyn Future<Output = Result<(), FlowtestError>> + Send>>;
type GuardAction = Box<dyn FnOnce() -> GuardFuture + Send>;

/// What happens to a guard's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Becomes the harness error when nothing failed before.
    Surface,
    /// Logged only.
    Log,
}

struct Guard {
    name: String,
    policy: GuardPolicy,
    action: GuardAction,
}

/// Stack of teardown guards, unwound exactly once.
#[derive(Default)]
pub struct TeardownStack {
    guards: Vec<Guard>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a guard that runs `action` during unwind.
    pub fn push<F, Fut>(&mut self, name: impl Into<String>, policy: GuardPolicy, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), FlowtestError>> + Send + 'static,
    {
        let name = name.into();
        debug!(guard = %name, "teardown guard registered");
        self.guards.push(Guard {
            name,
            policy,
            action: Box::new(move || Box::pin(action())),
        });
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Guard names in acquisition order.
    pub fn names(&self) -> Vec<&str> {
        self.guards.iter().map(|g| g.name.as_str()).collect()
    }

    /// Runs every guard in reverse order and returns the first surfaced error.
    ///
    /// Every guard runs even if an earlier one failed.
    pub async fn unwind(mut self) -> Option<FlowtestError> {
        let mut surfaced = None;
        while let Some(guard) = self.guards.pop() {
            debug!(guard = %guard.name, "running teardown guard");
            match (guard.action)().await {
                Ok(()) => {}
                Err(e) if guard.policy == GuardPolicy::Surface && surfaced.is_none() => {
                    error!(guard = %guard.name, error = %e, "teardown failed");
                    surfaced = Some(e);
                }
                Err(e) => warn!(guard = %guard.name, error = %e, "teardown failed"),
            }
        }
        surfaced
    }

    /// Unwinds, then decides the harness outcome.
    ///
    /// `primary` (a setup or run error) always wins; a surfaced teardown error
    /// replaces only a successful `primary`.
    pub async fn finish<T>(self, primary: Result<T, FlowtestError>) -> Result<T, FlowtestError> {
        let teardown = self.unwind().await;
        match (primary, teardown) {
            (Err(e), Some(ignored)) => {
                warn!(error = %ignored, "teardown error superseded by earlier failure");
                Err(e)
            }
            (Err(e), None) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(value), None) => Ok(value),
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if !self.guards.is_empty() {
            warn!(
                pending = ?self.names(),
                "teardown stack dropped without unwinding; relying on resource drop"
            );
        }
    }
}
