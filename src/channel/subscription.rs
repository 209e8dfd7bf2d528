//! Subscription handles and identities.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispose::Disposable;
use crate::error::DisposeError;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Create a new random channel id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one registration within a channel.
///
/// Ids increase monotonically per channel, so they also encode subscription
/// order. Subscribing the same closure twice yields two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Channel side of a subscription, with the event type erased.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, listener: ListenerId);
}

/// Handle for one active listener registration.
///
/// Returned by [`EventChannel::subscribe`](crate::EventChannel::subscribe).
/// The handle only holds a weak reference to its channel: it never keeps the
/// channel or its listeners alive.
///
/// - [`dispose`](Self::dispose) is idempotent. Calls after the first, and calls
///   after the channel was torn down, are no-ops.
/// - Dropping the handle disposes it. Use
///   [`keep_until_teardown`](Self::keep_until_teardown) to let a registration
///   live as long as the channel instead.
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    listener: ListenerId,
    channel_id: ChannelId,
    active: Arc<AtomicBool>,
    channel: Weak<dyn Detach>,
    dispose_on_drop: bool,
}

impl Subscription {
    pub(crate) fn new(
        listener: ListenerId,
        channel_id: ChannelId,
        active: Arc<AtomicBool>,
        channel: Weak<dyn Detach>,
    ) -> Self {
        Self {
            listener,
            channel_id,
            active,
            channel,
            dispose_on_drop: true,
        }
    }

    /// The registration this handle controls.
    #[must_use]
    pub const fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// The channel this handle was issued by.
    #[must_use]
    pub const fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// True while the listener is registered and the channel still exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.channel.strong_count() > 0
    }

    /// Detaches the listener.
    ///
    /// After this returns, the listener is not invoked again, including by an
    /// `emit` that is already iterating on this thread. Safe to call from
    /// inside the listener itself.
    pub fn dispose(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.listener);
        }
    }

    /// Gives up the handle without detaching.
    ///
    /// The listener then stays registered until the channel is torn down.
    pub fn keep_until_teardown(mut self) {
        self.dispose_on_drop = false;
    }
}

impl Disposable for Subscription {
    fn dispose(&self) -> Result<(), DisposeError> {
        Subscription::dispose(self);
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        !self.is_active()
    }

    fn name(&self) -> &str {
        "subscription"
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.dispose_on_drop {
            Subscription::dispose(self);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("listener", &self.listener)
            .field("channel_id", &self.channel_id)
            .field("active", &self.is_active())
            .finish()
    }
}
