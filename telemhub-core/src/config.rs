//! Hub configuration.

use std::time::Duration;

use crate::broadcaster::DEFAULT_BROADCAST_INTERVAL;
use crate::error::ConfigError;
use crate::publisher::{PayloadFormat, PublisherConfig};
use crate::store::DEFAULT_HISTORY_CAPACITY;

/// Tunables for a [`Hub`](crate::Hub).
///
/// Defaults: 2000 events of history, one broadcast per 500ms, forward every
/// update downstream through a 64-slot queue with a 10s timeout, 16 buffered
/// snapshots per listener, and greet new listeners with the current snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Events kept in history.
    pub history_capacity: usize,
    /// Minimum time between two broadcasts.
    pub broadcast_interval: Duration,
    /// Minimum time between two downstream forwards. Zero forwards every update.
    pub publish_interval: Duration,
    /// Snapshots that may wait for the publisher task before new ones are dropped.
    pub publish_queue: usize,
    /// Upper bound on a single sink call.
    pub publish_timeout: Duration,
    /// Encoding of forwarded snapshots.
    pub payload_format: PayloadFormat,
    /// Buffer size of listeners created by [`Hub::subscribe`](crate::Hub::subscribe).
    pub listener_buffer: usize,
    /// Send the current snapshot to a listener as soon as it registers.
    pub greet_listeners: bool,
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.publish_queue == 0 {
            return Err(ConfigError::ZeroPublishQueue);
        }
        if self.listener_buffer == 0 {
            return Err(ConfigError::ZeroListenerBuffer);
        }
        if self.publish_timeout.is_zero() {
            return Err(ConfigError::ZeroPublishTimeout);
        }
        Ok(())
    }

    /// The subset of settings the downstream publisher needs.
    pub fn publisher(&self) -> PublisherConfig {
        PublisherConfig {
            interval: self.publish_interval,
            queue: self.publish_queue,
            timeout: self.publish_timeout,
            format: self.payload_format.clone(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            publish_interval: Duration::ZERO,
            publish_queue: 64,
            publish_timeout: Duration::from_secs(10),
            payload_format: PayloadFormat::default(),
            listener_buffer: 16,
            greet_listeners: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HubConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.history_capacity, 2000);
        assert_eq!(config.broadcast_interval, Duration::from_millis(500));
        assert!(config.greet_listeners);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut config = HubConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHistoryCapacity));

        config.history_capacity = 1;
        config.publish_queue = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPublishQueue));

        config.publish_queue = 1;
        config.listener_buffer = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroListenerBuffer));

        config.listener_buffer = 1;
        config.publish_timeout = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPublishTimeout));
    }

    #[test]
    fn zero_intervals_are_allowed() {
        let config = HubConfig {
            broadcast_interval: Duration::ZERO,
            publish_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn publisher_config_mirrors_hub_settings() {
        let config = HubConfig {
            publish_interval: Duration::from_secs(2),
            publish_queue: 8,
            ..Default::default()
        };
        let publisher = config.publisher();
        assert_eq!(publisher.interval, Duration::from_secs(2));
        assert_eq!(publisher.queue, 8);
        assert_eq!(publisher.timeout, Duration::from_secs(10));
        assert_eq!(publisher.format, PayloadFormat::Json);
    }
}
