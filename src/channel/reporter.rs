//! Sinks for listener failures caught during `emit`.

use std::sync::Mutex;

use tracing::error;

use crate::error::ListenerFailure;

/// Receives listener failures isolated by a channel.
///
/// Reporters run on the emitting thread, after the failing listener returned
/// and before the next listener runs. A reporter that panics is contained the
/// same way a listener is.
pub trait FailureReporter: Send + Sync {
    /// Handles one failure.
    fn report(&self, failure: &ListenerFailure);
}

/// Default reporter: logs every failure at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &ListenerFailure) {
        error!(
            channel = %failure.channel,
            channel_id = %failure.channel_id,
            listener = %failure.listener,
            occurred_at = %failure.occurred_at,
            "listener failed during emit: {}",
            failure.message
        );
    }
}

/// Keeps failures in memory for the host to inspect.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    failures: Mutex<Vec<ListenerFailure>>,
}

impl CollectingReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every failure seen so far, oldest first.
    #[must_use]
    pub fn failures(&self) -> Vec<ListenerFailure> {
        match self.failures.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns every failure seen so far.
    pub fn take(&self) -> Vec<ListenerFailure> {
        let mut guard = match self.failures.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }

    /// Number of failures currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.failures.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// True if no failure is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FailureReporter for CollectingReporter {
    fn report(&self, failure: &ListenerFailure) {
        let mut guard = match self.failures.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(failure.clone());
    }
}
