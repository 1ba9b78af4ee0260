/// Core data structures shared by the queue, the dispatchers and the transports
///
/// Events and payloads are short text strings. Addresses are 4-octet
/// network identities; the all-zero address marks a node slot that has not
/// been configured.
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// 4-octet network identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress([u8; 4]);

impl NodeAddress {
    /// The unconfigured address
    pub const UNSET: NodeAddress = NodeAddress([0; 4]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0
    }

    /// True for the all-zero address, which never matches a node
    pub fn is_unset(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl From<[u8; 4]> for NodeAddress {
    fn from(octets: [u8; 4]) -> Self {
        Self(octets)
    }
}

impl From<Ipv4Addr> for NodeAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self(ip.octets())
    }
}

impl From<NodeAddress> for Ipv4Addr {
    fn from(address: NodeAddress) -> Self {
        Ipv4Addr::from(address.0)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl FromStr for NodeAddress {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| RelayError::InvalidAddress(s.to_string()))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(address: NodeAddress) -> Self {
        address.to_string()
    }
}

/// Per-event retry policy
///
/// | Policy | send ok | send failed |
/// |---|---|---|
/// | `Once` | remove | remove |
/// | `Repeat` | remove | remove |
/// | `Confirm` | keep until a matching ack arrives | keep, resend after the resend delay |
/// | `OverrideTimeout` | remove | remove |
///
/// Only `Confirm` events are resent by the resend timer. `OverrideTimeout`
/// events are also queued and sent to timed out nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryPolicy {
    Once,
    Repeat,
    Confirm,
    OverrideTimeout,
}

/// Liveness state of a node as of the last edge-triggered check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// No traffic observed yet
    #[default]
    Unknown,
    Active,
    TimedOut,
}

/// Successful enqueue outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
    Success,
    /// Queued after evicting the oldest entry of a full queue
    OverflowSuccess,
}

/// One occupied queue slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub target: NodeAddress,
    pub port: u16,
    pub event: String,
    pub payload: String,
    /// Correlation id, unique among queued events, in `10..=99`
    pub event_id: u8,
    pub policy: RetryPolicy,
    /// Addressed to this device; served by the receive path, never sent
    pub loopback: bool,
}

/// Single-slot buffer holding the last event surfaced to the application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedEvent {
    pub event: String,
    pub payload: String,
    pub event_id: Option<u8>,
    pub sender: Option<NodeAddress>,
}

/// Truncate `text` to at most `max_len` bytes without splitting a character
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
