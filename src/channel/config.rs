//! Channel configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use comet_gateway::ChannelConfig;
//!
//! let config = ChannelConfig::new()
//!     .with_read_timeout(Duration::from_secs(60))
//!     .with_queue_capacity(16);
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default idle timeout applied before every read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Default timeout applied before every write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Default bound on concurrently running listener dispatches per channel.
pub const DEFAULT_MAX_INFLIGHT_DISPATCH: usize = 16;

// ============================================================================
// ChannelConfig
// ============================================================================

/// Per-channel timeouts and queue sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Idle timeout; re-armed before every frame read.
    pub read_timeout: Duration,

    /// Write timeout; re-armed before every frame write and flush.
    pub write_timeout: Duration,

    /// Outbound queue slots. `push` blocks while all are taken.
    pub queue_capacity: usize,

    /// Listener invocations allowed to run at once for one channel.
    pub max_inflight_dispatch: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChannelConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_inflight_dispatch: DEFAULT_MAX_INFLIGHT_DISPATCH,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChannelConfig {
    /// Sets the idle read timeout.
    #[inline]
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[inline]
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the in-flight dispatch bound.
    #[inline]
    #[must_use]
    pub const fn with_max_inflight_dispatch(mut self, max: usize) -> Self {
        self.max_inflight_dispatch = max;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ChannelConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero timeout, queue capacity or
    /// dispatch bound.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() {
            return Err(Error::config("read timeout must be greater than zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(Error::config("write timeout must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue capacity must be greater than zero"));
        }
        if self.max_inflight_dispatch == 0 {
            return Err(Error::config(
                "max in-flight dispatch must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(180));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ChannelConfig::new()
            .with_read_timeout(Duration::from_secs(1))
            .with_write_timeout(Duration::from_millis(500))
            .with_queue_capacity(32)
            .with_max_inflight_dispatch(4);

        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.write_timeout, Duration::from_millis(500));
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.max_inflight_dispatch, 4);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(ChannelConfig::new().with_queue_capacity(0).validate().is_err());
        assert!(
            ChannelConfig::new()
                .with_read_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ChannelConfig::new()
                .with_max_inflight_dispatch(0)
                .validate()
                .is_err()
        );
    }
}
