/// Queue configuration
///
/// Everything here is fixed when the `EventQueue` is built, except the
/// timing values, filter flags and control event names, which also have
/// runtime setters on the queue.
use serde::{Deserialize, Serialize};

use crate::contracts::NodeAddress;
use crate::errors::{RelayError, Result};

/// Upper bound on queue capacity: one slot per 2-digit event id
pub const MAX_QUEUE_CAPACITY: usize = 90;

/// Upper bound on node slots; node numbers fit in a byte
pub const MAX_NODE_COUNT: usize = 256;

/// Configuration for an `EventQueue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of outbound slots (1..=90)
    pub queue_capacity: usize,

    /// Longest event name kept when queueing
    pub send_event_length_max: usize,

    /// Longest payload kept when queueing, not counting the event id prefix
    pub send_payload_length_max: usize,

    /// Longest event name kept when receiving
    pub receive_event_length_max: usize,

    /// Longest payload kept when receiving, not counting the event id prefix
    pub receive_payload_length_max: usize,

    /// Node number of this device
    pub device_node: usize,

    /// Number of node slots; grown to cover `device_node` if needed
    pub node_count: usize,

    /// Addresses pre-assigned by node number; the device node entry is
    /// replaced by the local address
    pub node_addresses: Vec<NodeAddress>,

    /// A node is timed out once nothing was heard from it for this long
    pub node_timeout_ms: u64,

    /// Keepalives are queued this long before a node would time out
    pub keepalive_margin_ms: u64,

    /// Minimum delay between keepalives to the same node
    pub keepalive_resend_delay_ms: u64,

    /// Delay between round-robin resends of queued events
    pub resend_delay_ms: u64,

    /// Reject events to addresses that are not configured nodes
    pub send_nodes_only: bool,

    /// Silently drop frames from addresses that are not configured nodes
    pub receive_nodes_only: bool,

    /// Event name used to acknowledge `Confirm` events
    pub ack_event: Option<String>,

    /// Event name used for liveness checks
    pub keepalive_event: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            send_event_length_max: 15,
            send_payload_length_max: 80,
            receive_event_length_max: 15,
            receive_payload_length_max: 80,
            device_node: 0,
            node_count: 1,
            node_addresses: Vec::new(),
            node_timeout_ms: 270_000,
            keepalive_margin_ms: 30_000,
            keepalive_resend_delay_ms: 60_000,
            resend_delay_ms: 45_000,
            send_nodes_only: false,
            receive_nodes_only: false,
            ack_event: None,
            keepalive_event: None,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the send-side event and payload length limits
    pub fn with_send_lengths(mut self, event_max: usize, payload_max: usize) -> Self {
        self.send_event_length_max = event_max;
        self.send_payload_length_max = payload_max;
        self
    }

    /// Set the receive-side event and payload length limits
    pub fn with_receive_lengths(mut self, event_max: usize, payload_max: usize) -> Self {
        self.receive_event_length_max = event_max;
        self.receive_payload_length_max = payload_max;
        self
    }

    /// Set the device node number and the total node slot count
    pub fn with_nodes(mut self, device_node: usize, node_count: usize) -> Self {
        self.device_node = device_node;
        self.node_count = node_count;
        self
    }

    pub fn with_node_addresses(mut self, addresses: Vec<NodeAddress>) -> Self {
        self.node_addresses = addresses;
        self
    }

    pub fn with_node_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.node_timeout_ms = timeout_ms;
        self
    }

    /// Set the keepalive margin and resend delay
    pub fn with_keepalive_timing(mut self, margin_ms: u64, resend_delay_ms: u64) -> Self {
        self.keepalive_margin_ms = margin_ms;
        self.keepalive_resend_delay_ms = resend_delay_ms;
        self
    }

    pub fn with_resend_delay_ms(mut self, resend_delay_ms: u64) -> Self {
        self.resend_delay_ms = resend_delay_ms;
        self
    }

    pub fn with_send_nodes_only(mut self, enable: bool) -> Self {
        self.send_nodes_only = enable;
        self
    }

    pub fn with_receive_nodes_only(mut self, enable: bool) -> Self {
        self.receive_nodes_only = enable;
        self
    }

    pub fn with_ack_event(mut self, event: impl Into<String>) -> Self {
        self.ack_event = Some(event.into());
        self
    }

    pub fn with_keepalive_event(mut self, event: impl Into<String>) -> Self {
        self.keepalive_event = Some(event.into());
        self
    }

    /// Check the configuration and normalize derived values
    ///
    /// # Errors
    /// Returns `RelayError::InvalidQueueCapacity` if the capacity is zero or
    /// larger than the event id range allows, and `RelayError::InvalidNodeCount`
    /// if the node count, device node or address list needs more than
    /// `MAX_NODE_COUNT` node slots.
    pub fn validate(mut self) -> Result<Self> {
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(RelayError::InvalidQueueCapacity {
                requested: self.queue_capacity,
                max: MAX_QUEUE_CAPACITY,
            });
        }

        let node_count = self
            .node_count
            .max(self.device_node.saturating_add(1))
            .max(self.node_addresses.len());
        if node_count > MAX_NODE_COUNT {
            return Err(RelayError::InvalidNodeCount {
                requested: node_count,
                max: MAX_NODE_COUNT,
            });
        }
        self.node_count = node_count;

        if self.keepalive_margin_ms > self.node_timeout_ms {
            tracing::warn!(
                margin_ms = self.keepalive_margin_ms,
                timeout_ms = self.node_timeout_ms,
                "keepalive margin exceeds node timeout, clamping"
            );
            self.keepalive_margin_ms = self.node_timeout_ms;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.node_timeout_ms, 270_000);
        assert_eq!(config.resend_delay_ms, 45_000);
        assert!(config.ack_event.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(QueueConfig::new().with_queue_capacity(90).validate().is_ok());
        assert_eq!(
            QueueConfig::new().with_queue_capacity(91).validate(),
            Err(RelayError::InvalidQueueCapacity { requested: 91, max: 90 })
        );
        assert!(QueueConfig::new().with_queue_capacity(0).validate().is_err());
    }

    #[test]
    fn test_node_count_covers_device_node() {
        let config = QueueConfig::new().with_nodes(4, 2).validate().unwrap();
        assert_eq!(config.node_count, 5);

        let config = QueueConfig::new()
            .with_nodes(0, 1)
            .with_node_addresses(vec![NodeAddress::UNSET; 3])
            .validate()
            .unwrap();
        assert_eq!(config.node_count, 3);
    }

    #[test]
    fn test_node_count_bounds() {
        assert!(QueueConfig::new().with_nodes(255, 1).validate().is_ok());
        assert_eq!(
            QueueConfig::new().with_nodes(0, 257).validate(),
            Err(RelayError::InvalidNodeCount { requested: 257, max: 256 })
        );
        assert_eq!(
            QueueConfig::new().with_nodes(256, 1).validate(),
            Err(RelayError::InvalidNodeCount { requested: 257, max: 256 })
        );
        assert_eq!(
            QueueConfig::new()
                .with_node_addresses(vec![NodeAddress::UNSET; 300])
                .validate(),
            Err(RelayError::InvalidNodeCount { requested: 300, max: 256 })
        );
    }

    #[test]
    fn test_device_node_overflow_rejected() {
        let config = QueueConfig::new().with_nodes(usize::MAX, 1);
        assert_eq!(
            config.validate(),
            Err(RelayError::InvalidNodeCount { requested: usize::MAX, max: 256 })
        );
    }

    #[test]
    fn test_keepalive_margin_clamped() {
        let config = QueueConfig::new()
            .with_node_timeout_ms(1000)
            .with_keepalive_timing(5000, 100)
            .validate()
            .unwrap();
        assert_eq!(config.keepalive_margin_ms, 1000);
    }
}
