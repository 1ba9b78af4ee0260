/// Node table - identity and liveness of every configured peer
///
/// Liveness is derived only from observed traffic: inbound frames from a
/// node and successful sends to it refresh its timestamp. Nodes are looked
/// up by linear scan; node counts are small.
use crate::contracts::{NodeAddress, NodeState};
use crate::errors::{RelayError, Result};

/// One configured peer, or this device
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub address: NodeAddress,
    pub last_seen_ms: u64,
    pub state: NodeState,
    pub last_keepalive_sent_ms: u64,
}

/// Fixed-size table of nodes, sized once at construction
#[derive(Debug, Clone)]
pub struct NodeTable {
    nodes: Vec<Node>,
    device_node: usize,
    timeout_ms: u64,
    keepalive_margin_ms: u64,
    keepalive_resend_delay_ms: u64,
}

impl NodeTable {
    /// Create a table of `node_count` unconfigured nodes
    pub fn new(node_count: usize, device_node: usize, timeout_ms: u64) -> Self {
        Self {
            nodes: vec![Node::default(); node_count.max(device_node.saturating_add(1))],
            device_node,
            timeout_ms,
            keepalive_margin_ms: 0,
            keepalive_resend_delay_ms: 0,
        }
    }

    /// Set the keepalive margin and resend delay used by `keepalive_due`
    pub fn with_keepalive_timing(mut self, margin_ms: u64, resend_delay_ms: u64) -> Self {
        self.set_keepalive_margin_ms(margin_ms);
        self.keepalive_resend_delay_ms = resend_delay_ms;
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn device_node(&self) -> usize {
        self.device_node
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Change the node timeout; the keepalive margin is re-clamped to it
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
        self.keepalive_margin_ms = self.keepalive_margin_ms.min(timeout_ms);
    }

    pub fn keepalive_margin_ms(&self) -> u64 {
        self.keepalive_margin_ms
    }

    /// Set the keepalive margin, clamped to the node timeout
    pub fn set_keepalive_margin_ms(&mut self, margin_ms: u64) {
        self.keepalive_margin_ms = margin_ms.min(self.timeout_ms);
    }

    pub fn keepalive_resend_delay_ms(&self) -> u64 {
        self.keepalive_resend_delay_ms
    }

    pub fn set_keepalive_resend_delay_ms(&mut self, delay_ms: u64) {
        self.keepalive_resend_delay_ms = delay_ms;
    }

    /// Assign an address to a node slot
    ///
    /// # Errors
    /// Returns `RelayError::InvalidNode` if `index` is out of range.
    pub fn set_node(&mut self, index: usize, address: NodeAddress) -> Result<()> {
        let node = self.nodes.get_mut(index).ok_or(RelayError::InvalidNode(index))?;
        node.address = address;
        Ok(())
    }

    /// Reset a node slot to the unconfigured address
    pub fn remove_node(&mut self, index: usize) -> Result<()> {
        self.set_node(index, NodeAddress::UNSET)
    }

    /// Address of a configured node
    pub fn address(&self, index: usize) -> Option<NodeAddress> {
        self.nodes
            .get(index)
            .map(|node| node.address)
            .filter(|address| !address.is_unset())
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// True if `index` is in range and has an address assigned
    pub fn is_set(&self, index: usize) -> bool {
        self.address(index).is_some()
    }

    /// Resolve an address to a node index
    pub fn get_node(&self, address: NodeAddress) -> Option<usize> {
        if address.is_unset() {
            return None;
        }
        self.nodes.iter().position(|node| node.address == address)
    }

    /// True if `address` belongs to this device
    pub fn is_device(&self, address: NodeAddress) -> bool {
        self.get_node(address) == Some(self.device_node)
    }

    /// Record traffic with a node
    ///
    /// Refreshes its timestamp, promotes `Unknown` to `Active`, and moves the
    /// keepalive timestamp back by the resend delay so the next keepalive is
    /// gated only by the liveness window.
    pub fn touch(&mut self, index: usize, now_ms: u64) {
        let resend_delay_ms = self.keepalive_resend_delay_ms;
        if let Some(node) = self.nodes.get_mut(index) {
            node.last_seen_ms = now_ms;
            node.last_keepalive_sent_ms = now_ms.wrapping_sub(resend_delay_ms);
            if node.state == NodeState::Unknown {
                tracing::debug!(node = index, address = %node.address, "node active");
                node.state = NodeState::Active;
            }
        }
    }

    /// Record this device's own network activity
    pub fn touch_device(&mut self, now_ms: u64) {
        if let Some(node) = self.nodes.get_mut(self.device_node) {
            node.last_seen_ms = now_ms;
        }
    }

    fn elapsed_ms(node: &Node, now_ms: u64) -> u64 {
        now_ms.wrapping_sub(node.last_seen_ms)
    }

    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        let device_node = self.device_node;
        (0..self.nodes.len()).filter(move |&index| index != device_node && self.is_set(index))
    }

    /// Demote and return the first node that has newly timed out
    ///
    /// Only `Active` nodes are considered, so each timeout is reported once.
    pub fn check_timeout(&mut self, now_ms: u64) -> Option<usize> {
        let timeout_ms = self.timeout_ms;
        let index = self.peers().find(|&index| {
            let node = &self.nodes[index];
            node.state == NodeState::Active && Self::elapsed_ms(node, now_ms) > timeout_ms
        })?;
        self.nodes[index].state = NodeState::TimedOut;
        tracing::debug!(node = index, address = %self.nodes[index].address, "node timed out");
        Some(index)
    }

    /// Promote and return the first timed out node that is back within its window
    pub fn check_timein(&mut self, now_ms: u64) -> Option<usize> {
        let timeout_ms = self.timeout_ms;
        let index = self.peers().find(|&index| {
            let node = &self.nodes[index];
            node.state == NodeState::TimedOut && Self::elapsed_ms(node, now_ms) < timeout_ms
        })?;
        self.nodes[index].state = NodeState::Active;
        tracing::debug!(node = index, address = %self.nodes[index].address, "node timed in");
        Some(index)
    }

    /// True if the node is within its timeout window right now
    ///
    /// Does not change the node state. Out of range indexes are never alive.
    pub fn peek_state(&self, index: usize, now_ms: u64) -> bool {
        self.nodes
            .get(index)
            .map(|node| Self::elapsed_ms(node, now_ms) <= self.timeout_ms)
            .unwrap_or(false)
    }

    /// True if this device has had no network activity for the node timeout
    pub fn device_timed_out(&self, now_ms: u64) -> bool {
        !self.peek_state(self.device_node, now_ms)
    }

    /// Peers whose liveness window is about to expire and that have not
    /// been sent a keepalive recently
    pub fn keepalive_due(&self, now_ms: u64) -> Vec<usize> {
        let threshold_ms = self.timeout_ms.saturating_sub(self.keepalive_margin_ms);
        self.peers()
            .filter(|&index| {
                let node = &self.nodes[index];
                Self::elapsed_ms(node, now_ms) > threshold_ms
                    && now_ms.wrapping_sub(node.last_keepalive_sent_ms)
                        > self.keepalive_resend_delay_ms
            })
            .collect()
    }

    pub fn mark_keepalive_sent(&mut self, index: usize, now_ms: u64) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.last_keepalive_sent_ms = now_ms;
        }
    }
}
