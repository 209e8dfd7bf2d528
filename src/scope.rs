//! Explicit ownership context for long-lived services.
//!
//! A [`Scope`] owns the services created for one context (a screen, a
//! session) and hands out [`Scoped`] handles that never keep a service
//! alive on their own. Exiting the scope runs its exit teardowns and then
//! drops the services, which in turn tears down any channel they own.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::dispose::{CompositeSubscription, Disposable};
use crate::error::CompositeDisposeError;

struct ServiceEntry {
    type_name: &'static str,
    service: Arc<dyn Any + Send + Sync>,
}

/// Owner of a set of services and exit teardowns.
///
/// ```
/// use eventscope::{EventChannel, Scope};
///
/// let mut scope = Scope::new("word-list");
/// let words = scope.provide(EventChannel::<String>::named("words"));
///
/// let sub = words.with(|channel| channel.subscribe(|w: &String| println!("{w}"))).unwrap();
/// assert!(sub.is_active());
///
/// scope.exit().unwrap();
/// assert!(!words.is_alive());
/// assert!(!sub.is_active());
/// ```
pub struct Scope {
    tag: String,
    services: Vec<ServiceEntry>,
    teardowns: CompositeSubscription,
    exited: bool,
}

impl Scope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        debug!(scope = %tag, "scope entered");
        Self {
            tag,
            services: Vec::new(),
            teardowns: CompositeSubscription::new(),
            exited: false,
        }
    }

    /// Label used in logs.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Takes ownership of `service` for the lifetime of the scope.
    pub fn provide<T>(&mut self, service: T) -> Scoped<T>
    where
        T: Any + Send + Sync,
    {
        let service = Arc::new(service);
        let handle = Scoped {
            inner: Arc::downgrade(&service),
        };
        debug!(scope = %self.tag, service = type_name::<T>(), "service provided");
        self.services.push(ServiceEntry {
            type_name: type_name::<T>(),
            service,
        });
        handle
    }

    /// Registers `disposable` to run when the scope exits, before any
    /// service is dropped.
    pub fn on_exit<D: Disposable + 'static>(&self, disposable: D) {
        self.teardowns.add(disposable);
    }

    /// Number of services held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if no service is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Runs exit teardowns (most recent first), then drops services in
    /// reverse order of provision.
    ///
    /// Services are dropped even when a teardown fails.
    pub fn exit(mut self) -> Result<(), CompositeDisposeError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), CompositeDisposeError> {
        if self.exited {
            return Ok(());
        }
        self.exited = true;

        let teardowns = self.teardowns.dispose_all();

        let services = self.services.len();
        while let Some(entry) = self.services.pop() {
            debug!(
                scope = %self.tag,
                service = entry.type_name,
                handles = Arc::weak_count(&entry.service),
                "service released"
            );
            drop(entry);
        }

        debug!(
            scope = %self.tag,
            services,
            teardowns_ok = teardowns.is_ok(),
            "scope exited"
        );
        teardowns.map(|_| ())
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(scope = %self.tag, error = %err, "scope dropped with failing teardowns");
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services: Vec<&str> = self.services.iter().map(|e| e.type_name).collect();
        f.debug_struct("Scope")
            .field("tag", &self.tag)
            .field("services", &services)
            .field("teardowns", &self.teardowns.len())
            .field("exited", &self.exited)
            .finish()
    }
}

/// Non-owning handle to a service held by a [`Scope`].
pub struct Scoped<T> {
    inner: Weak<T>,
}

impl<T> Scoped<T> {
    /// Runs `f` against the service if the scope still holds it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.upgrade().map(|service| f(&service))
    }

    /// True while the owning scope has not exited.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<T> Clone for Scoped<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("service", &type_name::<T>())
            .field("alive", &self.is_alive())
            .finish()
    }
}
