use std::fmt;
use std::ops::AddAssign;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{CompositeDisposeError, DisposeError};

use super::{dispose_guarded, Disposable};

#[derive(Default)]
struct CompositeState {
    held: Vec<Box<dyn Disposable>>,
    closed: bool,
}

/// Collects disposables and tears them all down with one call.
///
/// A composite is single-use: once [`dispose_all`](Self::dispose_all) has run
/// it is closed, and anything added afterwards is disposed on the spot. A
/// subscriber with a repeating active window keeps one composite per window,
/// e.g. `std::mem::take(&mut self.tokens).dispose_all()` when it stops.
///
/// Dropping a composite disposes whatever it still holds.
///
/// ```
/// use eventscope::{CompositeSubscription, EventChannel};
///
/// let channel: EventChannel<u32> = EventChannel::new();
/// let tokens = CompositeSubscription::new();
/// tokens.add(channel.subscribe(|n: &u32| println!("got {n}")));
/// tokens.add(channel.subscribe(|n: &u32| println!("also got {n}")));
/// assert_eq!(channel.listener_count(), 2);
///
/// assert_eq!(tokens.dispose_all().unwrap(), 2);
/// assert_eq!(channel.listener_count(), 0);
/// assert_eq!(tokens.dispose_all().unwrap(), 0);
/// ```
#[derive(Default)]
pub struct CompositeSubscription {
    state: Mutex<CompositeState>,
}

impl CompositeSubscription {
    /// Creates an empty, open composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CompositeState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Takes ownership of `disposable` until the next [`dispose_all`](Self::dispose_all).
    ///
    /// On a closed composite the disposable is disposed immediately; a failure
    /// there is logged, not returned.
    pub fn add<D: Disposable + 'static>(&self, disposable: D) {
        let mut state = self.lock();
        if !state.closed {
            state.held.push(Box::new(disposable));
            return;
        }
        drop(state);

        debug!(name = disposable.name(), "composite already disposed; disposing late addition");
        if let Err(err) = dispose_guarded(&disposable) {
            warn!(name = disposable.name(), error = %err, "late addition failed to tear down");
        }
    }

    /// Disposes everything held, most recently added first, and closes the
    /// composite.
    ///
    /// Every held disposable is attempted even when some fail. Returns how
    /// many were disposed; later calls return `Ok(0)`.
    pub fn dispose_all(&self) -> Result<usize, CompositeDisposeError> {
        let held = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.held)
        };

        let attempted = held.len();
        let mut failures: Vec<DisposeError> = Vec::new();
        for disposable in held.into_iter().rev() {
            if let Err(err) = dispose_guarded(disposable.as_ref()) {
                failures.push(err);
            }
        }

        if attempted > 0 {
            debug!(attempted, failed = failures.len(), "composite disposed");
        }

        if failures.is_empty() {
            Ok(attempted)
        } else {
            Err(CompositeDisposeError { attempted, failures })
        }
    }

    /// Number of disposables currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().held.len()
    }

    /// True if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`dispose_all`](Self::dispose_all) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Disposable for CompositeSubscription {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.dispose_all().map(|_| ()).map_err(DisposeError::Batch)
    }

    fn is_disposed(&self) -> bool {
        self.is_closed()
    }

    fn name(&self) -> &str {
        "composite"
    }
}

impl<D: Disposable + 'static> AddAssign<D> for CompositeSubscription {
    fn add_assign(&mut self, disposable: D) {
        self.add(disposable);
    }
}

impl Drop for CompositeSubscription {
    fn drop(&mut self) {
        if let Err(err) = self.dispose_all() {
            warn!(error = %err, "composite dropped with failing teardowns");
        }
    }
}

impl fmt::Debug for CompositeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CompositeSubscription")
            .field("held", &state.held.len())
            .field("closed", &state.closed)
            .finish()
    }
}
