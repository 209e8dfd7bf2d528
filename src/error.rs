//! Error types for eventscope.
//!
//! Only real failures are modelled here. Repeated disposal, disposal after the
//! channel is gone and adding to a closed composite are defined as no-ops (or
//! immediate disposal) and never surface as errors.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::channel::{ChannelId, ListenerId};

/// Boxed error returned by fallible teardown closures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A listener panicked while an event was being delivered.
///
/// The failure is isolated to that one listener: delivery continues with the
/// next listener and the emitting owner never sees it. It is handed to the
/// channel's [`FailureReporter`](crate::channel::FailureReporter).
#[derive(Debug, Clone, Error)]
#[error("Listener {listener} on channel '{channel}' ({channel_id}) failed: {message}")]
pub struct ListenerFailure {
    /// Configured name of the channel.
    pub channel: String,
    /// Identity of the channel instance.
    pub channel_id: ChannelId,
    /// Registration that failed.
    pub listener: ListenerId,
    /// Panic payload, rendered as text.
    pub message: String,
    /// When the failure was caught.
    pub occurred_at: DateTime<Utc>,
}

/// A single disposable failed to tear down.
#[derive(Debug, Error)]
pub enum DisposeError {
    #[error("Teardown '{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Teardown '{name}' panicked: {message}")]
    Panicked {
        name: String,
        message: String,
    },

    #[error("Nested batch teardown failed: {0}")]
    Batch(#[from] CompositeDisposeError),
}

impl DisposeError {
    /// Returns true if the teardown panicked instead of returning an error.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// Aggregate of every failure seen during one batch teardown.
///
/// A batch never stops at the first failure; every held disposable is
/// attempted before this is returned.
#[derive(Debug)]
pub struct CompositeDisposeError {
    /// Number of disposables the batch attempted.
    pub attempted: usize,
    /// Failures, in the order they occurred.
    pub failures: Vec<DisposeError>,
}

impl fmt::Display for CompositeDisposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} disposables failed to tear down",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeDisposeError {}

/// Invalid channel configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Channel name cannot be empty")]
    EmptyName,

    #[error("Field '{field}' must be at least {min}, got {actual}")]
    TooSmall {
        field: String,
        min: usize,
        actual: usize,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error type for eventscope.
#[derive(Debug, Error)]
pub enum EventscopeError {
    #[error("Dispose error: {0}")]
    Dispose(#[from] DisposeError),

    #[error("Batch dispose error: {0}")]
    Batch(#[from] CompositeDisposeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EventscopeError {
    /// Returns true if this error came out of a teardown.
    #[must_use]
    pub const fn is_dispose(&self) -> bool {
        matches!(self, Self::Dispose(_) | Self::Batch(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for eventscope operations.
pub type EventscopeResult<T> = Result<T, EventscopeError>;

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_failure_message() {
        let err = ListenerFailure {
            channel: "words".to_string(),
            channel_id: ChannelId::new(),
            listener: ListenerId::from_raw(3),
            message: "boom".to_string(),
            occurred_at: Utc::now(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("words"));
        assert!(msg.contains("#3"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_dispose_error_panicked() {
        let err = DisposeError::Panicked {
            name: "close-db".to_string(),
            message: "oops".to_string(),
        };
        assert!(err.is_panic());
        let msg = format!("{err}");
        assert!(msg.contains("close-db"));
        assert!(msg.contains("oops"));
    }

    #[test]
    fn test_dispose_error_failed_keeps_source() {
        let err = DisposeError::Failed {
            name: "flush".to_string(),
            source: "disk full".into(),
        };
        assert!(!err.is_panic());
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{err}").contains("disk full"));
    }

    #[test]
    fn test_composite_error_lists_failures() {
        let err = CompositeDisposeError {
            attempted: 3,
            failures: vec![DisposeError::Panicked {
                name: "second".to_string(),
                message: "bad".to_string(),
            }],
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("1 of 3"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_config_error_too_small() {
        let err = ConfigError::TooSmall {
            field: "pause_buffer_capacity".to_string(),
            min: 1,
            actual: 0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("pause_buffer_capacity"));
        assert!(msg.contains("at least 1"));
    }

    #[test]
    fn test_top_level_conversions() {
        let err: EventscopeError = ConfigError::EmptyName.into();
        assert!(err.is_config());
        assert!(!err.is_dispose());

        let err: EventscopeError = CompositeDisposeError {
            attempted: 1,
            failures: Vec::new(),
        }
        .into();
        assert!(err.is_dispose());
    }

    #[test]
    fn test_panic_message_variants() {
        let a: Box<dyn Any + Send> = Box::new("static");
        let b: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "unknown panic");
    }
}
