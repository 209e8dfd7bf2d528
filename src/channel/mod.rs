//! Typed event channels.
//!
//! An [`EventChannel`] belongs to one owner (a controller, a service) that
//! announces discrete facts by emitting events of a closed type `E`. Anything
//! interested subscribes a listener while it is in its active window and
//! disposes the returned [`Subscription`] when it leaves.
//!
//! # Invariants
//!
//! 1. A listener is registered iff its subscription is active.
//! 2. Listeners are invoked in subscription order, once per delivered event.
//! 3. No listener is invoked after its subscription was disposed.
//! 4. Disposal is idempotent, and a no-op once the channel is gone.
//! 5. Tearing the channel down releases every listener it holds.
//!
//! # Failure modes
//!
//! - Listener panic: caught, handed to the [`FailureReporter`], delivery goes on.
//! - Reporter panic: caught and logged.
//! - Pause buffer full: oldest event dropped, counted, logged at `warn`.
//! - Panic while releasing a listener or event: caught, logged at `error`.

/// The channel itself.
pub mod emitter;
/// Failure reporting.
pub mod reporter;
/// Subscription handles and identities.
pub mod subscription;

pub use emitter::{EmitOutcome, EventChannel, Listener};
pub use reporter::{CollectingReporter, FailureReporter, TracingReporter};
pub use subscription::{ChannelId, ListenerId, Subscription};
