//! Disposal: the [`Disposable`] seam, closure-backed [`Teardown`], and the
//! batch aggregator [`CompositeSubscription`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use crate::error::{panic_message, BoxError, DisposeError};

/// Batch teardown.
pub mod composite;

pub use composite::CompositeSubscription;

/// Something that can be torn down exactly once.
///
/// `dispose` must be idempotent: the first call does the work, later calls
/// return `Ok(())` without side effects.
pub trait Disposable: Send {
    /// Tears the resource down.
    fn dispose(&self) -> Result<(), DisposeError>;

    /// True once the resource no longer needs disposing.
    fn is_disposed(&self) -> bool;

    /// Label used in errors and logs.
    fn name(&self) -> &str {
        "disposable"
    }
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) -> Result<(), DisposeError> {
        (**self).dispose()
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

type TeardownFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// One-shot cleanup closure usable wherever a [`Disposable`] is expected.
///
/// A returned error becomes [`DisposeError::Failed`], a panic becomes
/// [`DisposeError::Panicked`]. Either way the closure is spent.
pub struct Teardown {
    name: String,
    action: Mutex<Option<TeardownFn>>,
}

impl Teardown {
    /// Infallible cleanup.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::fallible(name, move || {
            action();
            Ok(())
        })
    }

    /// Cleanup that may fail.
    pub fn fallible<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    fn take_action(&self) -> Option<TeardownFn> {
        match self.action.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Disposable for Teardown {
    fn dispose(&self) -> Result<(), DisposeError> {
        let Some(action) = self.take_action() else {
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DisposeError::Failed {
                name: self.name.clone(),
                source,
            }),
            Err(payload) => Err(DisposeError::Panicked {
                name: self.name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn is_disposed(&self) -> bool {
        match self.action.lock() {
            Ok(g) => g.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Disposes `disposable`, turning a panic into [`DisposeError::Panicked`].
pub(crate) fn dispose_guarded(disposable: &dyn Disposable) -> Result<(), DisposeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| disposable.dispose())) {
        Ok(result) => result,
        Err(payload) => Err(DisposeError::Panicked {
            name: disposable.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}
