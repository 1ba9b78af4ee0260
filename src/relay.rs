/// Event queue - the owning state of one relay endpoint
///
/// `EventQueue` holds the node table, the outbound queue, the single-slot
/// receive buffer and the resend timer. The application drives it from one
/// control loop: `queue` to submit events, `queue_handler` to send,
/// `available_event` to receive, and the liveness checks periodically.
use std::fmt::Display;

use crate::ack_manager::AckManager;
use crate::config::QueueConfig;
use crate::contracts::{
    truncate_text, EnqueueStatus, NodeAddress, QueuedEvent, ReceivedEvent, RetryPolicy,
};
use crate::errors::{RelayError, Result};
use crate::node_table::NodeTable;
use crate::outbound_queue::OutboundQueue;

pub struct EventQueue {
    pub(crate) config: QueueConfig,
    pub(crate) nodes: NodeTable,
    pub(crate) outbound: OutboundQueue,
    pub(crate) received: ReceivedEvent,
    /// Event length of a buffered event not yet read by the application
    pub(crate) received_pending: Option<usize>,
    pub(crate) last_send_ms: u64,
}

impl EventQueue {
    /// Build a queue from `config`, with `local_address` as this device's node
    ///
    /// # Errors
    /// Returns `RelayError::InvalidQueueCapacity` for a capacity outside 1..=90.
    pub fn new(config: QueueConfig, local_address: NodeAddress) -> Result<Self> {
        let config = config.validate()?;

        let mut nodes = NodeTable::new(config.node_count, config.device_node, config.node_timeout_ms)
            .with_keepalive_timing(config.keepalive_margin_ms, config.keepalive_resend_delay_ms);
        for (index, address) in config.node_addresses.iter().enumerate() {
            if index != config.device_node && !address.is_unset() {
                nodes.set_node(index, *address)?;
            }
        }
        nodes.set_node(config.device_node, local_address)?;

        tracing::debug!(
            capacity = config.queue_capacity,
            nodes = nodes.len(),
            device_node = config.device_node,
            address = %local_address,
            "event queue ready"
        );

        Ok(Self {
            outbound: OutboundQueue::new(config.queue_capacity),
            nodes,
            received: ReceivedEvent::default(),
            received_pending: None,
            last_send_ms: 0,
            config,
        })
    }

    /// Queue an event for `target`
    ///
    /// Events to this device are served back by `available_event` without
    /// touching the transport. Event and payload are truncated to the send
    /// length limits.
    ///
    /// # Errors
    /// - `ConfirmWithoutAck` for a `Confirm` event with no ack event configured
    /// - `UnknownTarget` for a non-node target while send-nodes-only is on
    /// - `TargetTimedOut` for a timed out node, unless the policy is `OverrideTimeout`
    pub fn queue(
        &mut self,
        target: NodeAddress,
        port: u16,
        event: &str,
        payload: &str,
        policy: RetryPolicy,
        now_ms: u64,
    ) -> Result<EnqueueStatus> {
        if policy == RetryPolicy::Confirm && self.config.ack_event.is_none() {
            return Err(RelayError::ConfirmWithoutAck);
        }

        let loopback = match self.nodes.get_node(target) {
            None if self.config.send_nodes_only => return Err(RelayError::UnknownTarget(target)),
            None => false,
            Some(index) if index == self.nodes.device_node() => true,
            Some(index) => {
                if !self.nodes.peek_state(index, now_ms) && !AckManager::overrides_timeout(policy) {
                    return Err(RelayError::TargetTimedOut(target));
                }
                false
            }
        };

        let event = truncate_text(event, self.config.send_event_length_max);
        let payload = truncate_text(payload, self.config.send_payload_length_max);
        let insertion = self
            .outbound
            .insert(target, port, event, payload, policy, loopback)?;

        tracing::debug!(
            event_id = insertion.event_id,
            slot = insertion.slot,
            %target,
            ?policy,
            loopback,
            "event queued"
        );

        Ok(if insertion.evicted {
            EnqueueStatus::OverflowSuccess
        } else {
            EnqueueStatus::Success
        })
    }

    /// Queue an event for a node by number
    ///
    /// # Errors
    /// Returns `RelayError::InvalidNode` if the node is out of range or unset,
    /// otherwise the same errors as `queue`.
    pub fn queue_to_node(
        &mut self,
        node: usize,
        port: u16,
        event: &str,
        payload: &str,
        policy: RetryPolicy,
        now_ms: u64,
    ) -> Result<EnqueueStatus> {
        let target = self.nodes.address(node).ok_or(RelayError::InvalidNode(node))?;
        self.queue(target, port, event, payload, policy, now_ms)
    }

    /// Queue any displayable event and payload, e.g. numbers or addresses
    pub fn queue_display<E, P>(
        &mut self,
        target: NodeAddress,
        port: u16,
        event: &E,
        payload: &P,
        policy: RetryPolicy,
        now_ms: u64,
    ) -> Result<EnqueueStatus>
    where
        E: Display + ?Sized,
        P: Display + ?Sized,
    {
        self.queue(target, port, &event.to_string(), &payload.to_string(), policy, now_ms)
    }

    /// Read and clear the overflow flag
    pub fn check_queue_overflow(&mut self) -> bool {
        self.outbound.take_overflow()
    }

    /// Drop every queued event, loopback events included
    pub fn flush_queue(&mut self) {
        tracing::debug!(dropped = self.outbound.len(), "queue flushed");
        self.outbound.clear();
    }

    pub fn queue_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn loopback_len(&self) -> usize {
        self.outbound.loopback_count()
    }

    /// Queued events, oldest first
    pub fn queued_events(&self) -> impl Iterator<Item = &QueuedEvent> + '_ {
        self.outbound.iter()
    }

    /// Next node that has newly timed out, if any
    pub fn check_timeout(&mut self, now_ms: u64) -> Option<usize> {
        self.nodes.check_timeout(now_ms)
    }

    /// Next timed out node that is active again, if any
    pub fn check_timein(&mut self, now_ms: u64) -> Option<usize> {
        self.nodes.check_timein(now_ms)
    }

    /// True if `node` is within its timeout window; does not change its state
    pub fn check_state(&self, node: usize, now_ms: u64) -> bool {
        self.nodes.peek_state(node, now_ms)
    }

    /// True if this device has had no network activity for the node timeout
    pub fn check_timeout_self(&self, now_ms: u64) -> bool {
        self.nodes.device_timed_out(now_ms)
    }

    pub fn set_node(&mut self, node: usize, address: NodeAddress) -> Result<()> {
        self.nodes.set_node(node, address)
    }

    pub fn remove_node(&mut self, node: usize) -> Result<()> {
        self.nodes.remove_node(node)
    }

    pub fn node_address(&self, node: usize) -> Option<NodeAddress> {
        self.nodes.address(node)
    }

    pub fn node_index(&self, address: NodeAddress) -> Option<usize> {
        self.nodes.get_node(address)
    }

    pub fn device_node(&self) -> usize {
        self.nodes.device_node()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn resend_delay_ms(&self) -> u64 {
        self.config.resend_delay_ms
    }

    pub fn set_resend_delay_ms(&mut self, delay_ms: u64) {
        self.config.resend_delay_ms = delay_ms;
    }

    pub fn node_timeout_ms(&self) -> u64 {
        self.nodes.timeout_ms()
    }

    pub fn set_node_timeout_ms(&mut self, timeout_ms: u64) {
        self.nodes.set_timeout_ms(timeout_ms);
    }

    pub fn keepalive_margin_ms(&self) -> u64 {
        self.nodes.keepalive_margin_ms()
    }

    /// Set the keepalive margin, clamped to the node timeout
    pub fn set_keepalive_margin_ms(&mut self, margin_ms: u64) {
        self.nodes.set_keepalive_margin_ms(margin_ms);
    }

    pub fn keepalive_resend_delay_ms(&self) -> u64 {
        self.nodes.keepalive_resend_delay_ms()
    }

    pub fn set_keepalive_resend_delay_ms(&mut self, delay_ms: u64) {
        self.nodes.set_keepalive_resend_delay_ms(delay_ms);
    }

    pub fn set_send_nodes_only(&mut self, enable: bool) {
        self.config.send_nodes_only = enable;
    }

    pub fn set_receive_nodes_only(&mut self, enable: bool) {
        self.config.receive_nodes_only = enable;
    }

    pub fn set_ack_event(&mut self, event: Option<String>) {
        self.config.ack_event = event;
    }

    pub fn ack_event(&self) -> Option<&str> {
        self.config.ack_event.as_deref()
    }

    pub fn set_keepalive_event(&mut self, event: Option<String>) {
        self.config.keepalive_event = event;
    }

    pub fn keepalive_event(&self) -> Option<&str> {
        self.config.keepalive_event.as_deref()
    }
}
