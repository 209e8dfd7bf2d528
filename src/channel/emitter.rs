//! The event channel: ordered listeners, snapshot fan-out, pause buffer.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};

use chrono::Utc;
use tracing::{debug, error, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{panic_message, ListenerFailure};

use super::reporter::{FailureReporter, TracingReporter};
use super::subscription::{ChannelId, Detach, ListenerId, Subscription};

/// A registered callback.
///
/// Share one `Listener` between several [`EventChannel::subscribe_shared`]
/// calls to register the same callback more than once.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;

/// What one call to [`EventChannel::emit`] or [`EventChannel::resume`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Events were delivered synchronously by this call.
    ///
    /// `events` includes events queued by re-entrant emits that this call
    /// drained. `invocations` counts listener calls, failed ones included.
    Delivered {
        events: usize,
        invocations: usize,
        failures: usize,
    },
    /// Called from a listener during a dispatch on this thread; that
    /// dispatch delivers the event next.
    Queued,
    /// The channel is paused; the event waits for [`EventChannel::resume`].
    Buffered,
}

impl EmitOutcome {
    const NOTHING: Self = Self::Delivered {
        events: 0,
        invocations: 0,
        failures: 0,
    };

    /// True if this call delivered synchronously.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Listener calls made by this call.
    #[must_use]
    pub const fn invocations(&self) -> usize {
        match self {
            Self::Delivered { invocations, .. } => *invocations,
            Self::Queued | Self::Buffered => 0,
        }
    }

    /// Listener failures caught by this call.
    #[must_use]
    pub const fn failures(&self) -> usize {
        match self {
            Self::Delivered { failures, .. } => *failures,
            Self::Queued | Self::Buffered => 0,
        }
    }
}

struct Registration<E> {
    id: ListenerId,
    listener: Listener<E>,
    active: Arc<AtomicBool>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
            active: Arc::clone(&self.active),
        }
    }
}

struct ChannelState<E> {
    registrations: Vec<Registration<E>>,
    pending: VecDeque<E>,
    paused: bool,
    // Thread currently running `drain`, if any.
    dispatcher: Option<ThreadId>,
    closed: bool,
}

#[derive(Default)]
struct Tally {
    events: usize,
    invocations: usize,
    failures: usize,
}

struct ChannelShared<E> {
    id: ChannelId,
    config: ChannelConfig,
    reporter: Arc<dyn FailureReporter>,
    next_listener: AtomicU64,
    dropped_events: AtomicU64,
    state: Mutex<ChannelState<E>>,
    turn: Condvar,
}

/// Hands the dispatch back if `drain` unwinds.
struct DispatchGuard<'a, E> {
    shared: &'a ChannelShared<E>,
    owner: ThreadId,
}

impl<E> Drop for DispatchGuard<'_, E> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.dispatcher == Some(self.owner) {
            state.dispatcher = None;
            drop(state);
            self.shared.turn.notify_all();
        }
    }
}

/// Drops `value` without letting a panicking `Drop` escape.
fn release_quietly<T>(value: T, channel: &str) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(value))) {
        error!(
            channel = %channel,
            "panic while releasing a listener or event: {}",
            panic_message(payload.as_ref())
        );
    }
}

impl<E> ChannelShared<E> {
    // No critical section runs listener code, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, ChannelState<E>> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Waits until no other thread is dispatching.
    ///
    /// The flag is true when the calling thread is itself the dispatcher,
    /// i.e. the call comes from inside a listener.
    fn wait_turn(&self) -> (MutexGuard<'_, ChannelState<E>>, bool) {
        let me = thread::current().id();
        let mut state = self.lock();
        loop {
            let current = state.dispatcher;
            match current {
                None => return (state, false),
                Some(owner) if owner == me => return (state, true),
                Some(_) => {
                    state = match self.turn.wait(state) {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
            }
        }
    }

    fn next_pending(&self) -> Option<E> {
        let mut state = self.lock();
        let next = if state.paused {
            None
        } else {
            state.pending.pop_front()
        };
        if next.is_none() {
            state.dispatcher = None;
            drop(state);
            self.turn.notify_all();
        }
        next
    }

    /// Delivers queued events until the queue is empty or the channel pauses.
    /// The caller must have made itself the dispatcher.
    fn drain(&self) -> EmitOutcome {
        let _guard = DispatchGuard {
            shared: self,
            owner: thread::current().id(),
        };
        let mut tally = Tally::default();

        while let Some(event) = self.next_pending() {
            let snapshot = self.lock().registrations.clone();
            self.deliver(&event, &snapshot, &mut tally);
            // The snapshot may hold the last reference to a disposed listener.
            release_quietly((event, snapshot), &self.config.name);
        }

        EmitOutcome::Delivered {
            events: tally.events,
            invocations: tally.invocations,
            failures: tally.failures,
        }
    }

    fn deliver(&self, event: &E, snapshot: &[Registration<E>], tally: &mut Tally) {
        tally.events += 1;

        for registration in snapshot {
            // Disposed after the snapshot was taken: skip.
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }

            tally.invocations += 1;
            let listener = &registration.listener;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                tally.failures += 1;
                let failure = ListenerFailure {
                    channel: self.config.name.clone(),
                    channel_id: self.id,
                    listener: registration.id,
                    message: panic_message(payload.as_ref()),
                    occurred_at: Utc::now(),
                };
                self.report(&failure);
            }
        }
    }

    fn report(&self, failure: &ListenerFailure) {
        let reporter = &self.reporter;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| reporter.report(failure))) {
            error!(
                channel = %self.config.name,
                channel_id = %self.id,
                listener = %failure.listener,
                "failure reporter panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    fn teardown(&self) -> usize {
        let (registrations, pending) = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            state.paused = false;
            (
                std::mem::take(&mut state.registrations),
                std::mem::take(&mut state.pending),
            )
        };

        for registration in &registrations {
            registration.active.store(false, Ordering::Release);
        }
        let released = registrations.len();

        debug!(
            channel = %self.config.name,
            channel_id = %self.id,
            released,
            discarded = pending.len(),
            "channel torn down"
        );

        release_quietly((registrations, pending), &self.config.name);
        released
    }
}

impl<E: Send + 'static> Detach for ChannelShared<E> {
    fn detach(&self, listener: ListenerId) {
        let (removed, remaining) = {
            let mut state = self.lock();
            let position = state.registrations.iter().position(|r| r.id == listener);
            let removed = position.map(|pos| state.registrations.remove(pos));
            (removed, state.registrations.len())
        };

        if removed.is_some() {
            debug!(
                channel = %self.config.name,
                channel_id = %self.id,
                listener = %listener,
                remaining,
                "listener detached"
            );
        }
        // Dropped outside the lock: the closure may own handles that call back
        // into this channel.
        release_quietly(removed, &self.config.name);
    }
}

/// Single-owner, multi-subscriber broadcast channel for events of type `E`.
///
/// The owner keeps the channel and calls [`emit`](Self::emit). Subscribers
/// call [`subscribe`](Self::subscribe) while they want events and dispose the
/// returned [`Subscription`] when they stop. Dropping (or
/// [`close`](Self::close)-ing) the channel releases every listener it still
/// holds, whatever the state of the outstanding subscriptions.
///
/// ## Delivery rules
/// - Listeners run synchronously on the emitting thread, in subscription order.
/// - Each event is delivered against a snapshot of the listeners taken when its
///   delivery starts. A listener disposed before its turn is skipped; a listener
///   subscribed during delivery first sees the next event.
/// - A panicking listener is isolated: the panic is reported to the channel's
///   [`FailureReporter`] and delivery continues with the next listener.
/// - `emit` called from a listener queues the event behind the current one, so
///   every listener observes events in emission order. `emit` from another
///   thread waits for the running dispatch to finish, then delivers its event
///   before returning. A listener must therefore not block on another thread
///   that is emitting on the same channel.
/// - While [paused](Self::pause), events are buffered (bounded by
///   [`ChannelConfig::pause_buffer_capacity`], oldest dropped first) and
///   delivered by [`resume`](Self::resume) to the listeners active then.
///
/// ## Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use eventscope::EventChannel;
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum CartEvent {
///     Added(String),
/// }
///
/// let channel = EventChannel::named("cart");
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let sub = channel.subscribe(move |event: &CartEvent| match event {
///     CartEvent::Added(item) => sink.lock().unwrap().push(item.clone()),
/// });
///
/// channel.emit(CartEvent::Added("pen".to_string()));
/// sub.dispose();
/// channel.emit(CartEvent::Added("cup".to_string()));
///
/// assert_eq!(*seen.lock().unwrap(), vec!["pen".to_string()]);
/// ```
pub struct EventChannel<E: Send + 'static> {
    shared: Arc<ChannelShared<E>>,
}

impl<E: Send + 'static> EventChannel<E> {
    /// Creates a channel with the default configuration, logging failures.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Creates a channel with the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_config(ChannelConfig::named(name))
    }

    /// Creates a channel that logs failures through [`TracingReporter`].
    #[must_use]
    pub fn with_config(config: ChannelConfig) -> Self {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    /// Creates a channel that sends listener failures to `reporter`.
    ///
    /// A zero pause buffer capacity is clamped to 1.
    #[must_use]
    pub fn with_reporter(mut config: ChannelConfig, reporter: Arc<dyn FailureReporter>) -> Self {
        config.pause_buffer_capacity = config.pause_buffer_capacity.max(1);
        let id = ChannelId::new();
        trace!(channel = %config.name, channel_id = %id, "channel created");

        Self {
            shared: Arc::new(ChannelShared {
                id,
                config,
                reporter,
                next_listener: AtomicU64::new(1),
                dropped_events: AtomicU64::new(0),
                state: Mutex::new(ChannelState {
                    registrations: Vec::new(),
                    pending: VecDeque::new(),
                    paused: false,
                    dispatcher: None,
                    closed: false,
                }),
                turn: Condvar::new(),
            }),
        }
    }

    /// Identity of this channel instance.
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    /// Configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Registers `listener` and returns its handle.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(listener))
    }

    /// Registers an already shared listener.
    ///
    /// The same `Listener` may be registered any number of times; every call
    /// returns an independent subscription.
    pub fn subscribe_shared(&self, listener: Listener<E>) -> Subscription {
        let id = ListenerId::from_raw(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));

        let count = {
            let mut state = self.shared.lock();
            state.registrations.push(Registration {
                id,
                listener,
                active: Arc::clone(&active),
            });
            state.registrations.len()
        };

        debug!(
            channel = %self.shared.config.name,
            channel_id = %self.shared.id,
            listener = %id,
            listeners = count,
            "listener subscribed"
        );

        let channel: Weak<dyn Detach> = Arc::downgrade(&self.shared) as Weak<dyn Detach>;
        Subscription::new(id, self.shared.id, active, channel)
    }

    /// Delivers `event` to every active listener.
    ///
    /// Never fails from the owner's point of view: listener panics are
    /// isolated and reported, see [`EmitOutcome`] for what happened.
    pub fn emit(&self, event: E) -> EmitOutcome {
        let (mut state, reentrant) = self.shared.wait_turn();

        if state.paused {
            let capacity = self.shared.config.pause_buffer_capacity;
            let mut overflow = Vec::new();
            while state.pending.len() >= capacity {
                match state.pending.pop_front() {
                    Some(old) => overflow.push(old),
                    None => break,
                }
            }
            state.pending.push_back(event);
            drop(state);

            if !overflow.is_empty() {
                let count = overflow.len() as u64;
                let dropped = self.shared.dropped_events.fetch_add(count, Ordering::Relaxed) + count;
                warn!(
                    channel = %self.shared.config.name,
                    channel_id = %self.shared.id,
                    capacity,
                    evicted = count,
                    dropped,
                    "pause buffer full; dropped oldest events"
                );
                release_quietly(overflow, &self.shared.config.name);
            }
            return EmitOutcome::Buffered;
        }

        state.pending.push_back(event);
        if reentrant {
            return EmitOutcome::Queued;
        }
        state.dispatcher = Some(thread::current().id());
        drop(state);

        self.shared.drain()
    }

    /// Stops delivery; later events are buffered until [`resume`](Self::resume).
    ///
    /// Pausing from inside a listener lets the current event finish and holds
    /// back the rest.
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if !state.paused {
            state.paused = true;
            drop(state);
            debug!(channel = %self.shared.config.name, channel_id = %self.shared.id, "channel paused");
        }
    }

    /// Resumes delivery and flushes the buffer to the listeners active now.
    ///
    /// Called from a listener, returns [`EmitOutcome::Queued`]: the dispatch
    /// already running on this thread flushes the buffer instead.
    pub fn resume(&self) -> EmitOutcome {
        let (mut state, reentrant) = self.shared.wait_turn();
        if !state.paused {
            return EmitOutcome::NOTHING;
        }
        state.paused = false;
        let buffered = state.pending.len();

        if reentrant {
            return EmitOutcome::Queued;
        }
        if buffered == 0 {
            return EmitOutcome::NOTHING;
        }
        state.dispatcher = Some(thread::current().id());
        drop(state);

        debug!(
            channel = %self.shared.config.name,
            channel_id = %self.shared.id,
            buffered,
            "channel resumed"
        );
        self.shared.drain()
    }

    /// True while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.lock().registrations.len()
    }

    /// Number of events waiting for delivery (buffered or queued).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Events dropped because the pause buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }

    /// Tears the channel down and returns how many registrations it released.
    ///
    /// Equivalent to dropping it; outstanding subscriptions become inactive and
    /// disposing them is a no-op.
    pub fn close(self) -> usize {
        self.shared.teardown()
    }
}

impl<E: Send + 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> Drop for EventChannel<E> {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl<E: Send + 'static> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("EventChannel")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("listeners", &state.registrations.len())
            .field("pending", &state.pending.len())
            .field("paused", &state.paused)
            .finish()
    }
}
