//! # eventscope - scoped event channels
//!
//! A typed publish/subscribe channel for in-process events whose subscribers
//! come and go with their lifecycle. The owner of a channel emits events; a
//! subscriber registers a listener while it is active and disposes the
//! returned handle when it leaves, so no callback ever reaches a subscriber
//! that is gone.
//!
//! ## Core Concepts
//!
//! - **EventChannel**: single-owner, multi-subscriber broadcast of a closed event type
//! - **Subscription**: idempotent handle that detaches exactly one listener
//! - **CompositeSubscription**: batch of disposables torn down with one call
//! - **Scope**: explicit owner of services, released in reverse order on exit
//!
//! ## Usage
//!
//! ```rust
//! use eventscope::{CompositeSubscription, EventChannel};
//!
//! #[derive(Debug, Clone)]
//! enum WordEvent {
//!     NewWordAdded { word: String },
//! }
//!
//! let words: EventChannel<WordEvent> = EventChannel::named("words");
//!
//! // Subscriber becomes active.
//! let tokens = CompositeSubscription::new();
//! tokens.add(words.subscribe(|event: &WordEvent| match event {
//!     WordEvent::NewWordAdded { word } => println!("added {word}"),
//! }));
//!
//! words.emit(WordEvent::NewWordAdded { word: "pen".into() });
//!
//! // Subscriber becomes inactive.
//! tokens.dispose_all().unwrap();
//! assert_eq!(words.listener_count(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod config;
pub mod dispose;
pub mod error;
pub mod scope;

// Re-export primary types at crate root for convenience
pub use channel::{
    ChannelId, CollectingReporter, EmitOutcome, EventChannel, FailureReporter, Listener,
    ListenerId, Subscription, TracingReporter,
};
pub use config::ChannelConfig;
pub use dispose::{CompositeSubscription, Disposable, Teardown};
pub use error::{
    BoxError, CompositeDisposeError, ConfigError, DisposeError, EventscopeError,
    EventscopeResult, ListenerFailure,
};
pub use scope::{Scope, Scoped};
