/// In-process transport
///
/// Every attached address gets an inbox. Sends to an address with no inbox,
/// or one switched unreachable, fail like a refused connection. A seeded
/// loss rate drops frames after a successful write, which is what a lossy
/// link looks like to the sender.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::contracts::NodeAddress;
use crate::errors::{RelayError, Result};
use crate::transport::Transport;

#[derive(Debug, Clone)]
struct Frame {
    sender: NodeAddress,
    event: String,
    payload: String,
}

#[derive(Debug)]
struct NetworkState {
    inboxes: HashMap<NodeAddress, VecDeque<Frame>>,
    unreachable: HashSet<NodeAddress>,
    loss_rate: f64,
    rng: StdRng,
    delivered: usize,
    lost: usize,
}

/// Shared in-process network
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl MemoryNetwork {
    /// Create a lossless network; `seed` drives loss decisions
    pub fn new(seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(NetworkState {
                inboxes: HashMap::new(),
                unreachable: HashSet::new(),
                loss_rate: 0.0,
                rng: StdRng::seed_from_u64(seed),
                delivered: 0,
                lost: 0,
            })),
        }
    }

    /// Drop each written frame with probability `rate`
    pub fn with_loss_rate(self, rate: f64) -> Self {
        self.state.borrow_mut().loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Create the transport endpoint for `address`
    pub fn attach(&self, address: NodeAddress) -> MemoryTransport {
        self.state.borrow_mut().inboxes.entry(address).or_default();
        MemoryTransport {
            address,
            network: self.clone(),
            pending: None,
            sends: 0,
            polls: 0,
        }
    }

    /// Make sends to `address` fail or succeed again
    pub fn set_reachable(&self, address: NodeAddress, reachable: bool) {
        let mut state = self.state.borrow_mut();
        if reachable {
            state.unreachable.remove(&address);
        } else {
            state.unreachable.insert(address);
        }
    }

    /// Frames waiting in the inbox of `address`
    pub fn pending_for(&self, address: NodeAddress) -> usize {
        self.state
            .borrow()
            .inboxes
            .get(&address)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Frames delivered to an inbox so far
    pub fn delivered(&self) -> usize {
        self.state.borrow().delivered
    }

    /// Frames written but dropped by the loss rate
    pub fn lost(&self) -> usize {
        self.state.borrow().lost
    }

    fn deliver(&self, target: NodeAddress, frame: Frame) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.unreachable.contains(&target) || !state.inboxes.contains_key(&target) {
            return Err(RelayError::Io(format!("connection refused by {}", target)));
        }

        let loss_rate = state.loss_rate;
        if loss_rate > 0.0 && state.rng.gen_bool(loss_rate) {
            state.lost += 1;
            tracing::trace!(%target, event = %frame.event, "frame lost");
            return Ok(());
        }

        state.delivered += 1;
        if let Some(inbox) = state.inboxes.get_mut(&target) {
            inbox.push_back(frame);
        }
        Ok(())
    }

    fn next_frame(&self, address: NodeAddress) -> Option<Frame> {
        self.state
            .borrow_mut()
            .inboxes
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
    }
}

/// Endpoint of a `MemoryNetwork` bound to one address
#[derive(Debug)]
pub struct MemoryTransport {
    address: NodeAddress,
    network: MemoryNetwork,
    pending: Option<Frame>,
    sends: usize,
    polls: usize,
}

impl MemoryTransport {
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    /// Number of `send` calls made through this endpoint
    pub fn send_count(&self) -> usize {
        self.sends
    }

    /// Number of `poll_incoming` calls made on this endpoint
    pub fn poll_count(&self) -> usize {
        self.polls
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, target: NodeAddress, _port: u16, event: &str, payload: &str) -> Result<usize> {
        self.sends += 1;
        let frame = Frame {
            sender: self.address,
            event: event.to_string(),
            payload: payload.to_string(),
        };
        self.network.deliver(target, frame)?;
        Ok(event.len() + payload.len())
    }

    fn poll_incoming(&mut self) -> Option<usize> {
        self.polls += 1;
        if self.pending.is_none() {
            self.pending = self.network.next_frame(self.address);
        }
        self.pending.as_ref().map(|frame| frame.event.len())
    }

    fn read_event(&mut self) -> String {
        self.pending
            .as_ref()
            .map(|frame| frame.event.clone())
            .unwrap_or_default()
    }

    fn read_payload(&mut self) -> String {
        self.pending
            .as_ref()
            .map(|frame| frame.payload.clone())
            .unwrap_or_default()
    }

    fn sender_address(&self) -> Option<NodeAddress> {
        self.pending.as_ref().map(|frame| frame.sender)
    }

    fn flush(&mut self) {
        self.pending = None;
    }
}
