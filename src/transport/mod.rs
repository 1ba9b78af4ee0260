/// Transport collaborators
///
/// The queue core only needs frame-level send and receive of
/// `(event, payload)` text pairs. `UdpTransport` carries them over UDP
/// datagrams; `MemoryNetwork` connects queues inside one process.

pub mod memory;
pub mod udp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;

use crate::contracts::NodeAddress;
use crate::errors::Result;

/// Raw event transport driven by the queue's dispatchers
///
/// Calls are atomic at the frame level: a frame is either fully sent or
/// not sent, and an incoming frame is read as a whole.
pub trait Transport {
    /// Send one frame, returning the number of bytes written
    ///
    /// `Ok(0)` counts as a failed send.
    fn send(&mut self, target: NodeAddress, port: u16, event: &str, payload: &str) -> Result<usize>;

    /// Length of the event name of the next pending frame, if any
    fn poll_incoming(&mut self) -> Option<usize>;

    /// Event name of the pending frame
    fn read_event(&mut self) -> String;

    /// Raw payload of the pending frame, id prefix included
    fn read_payload(&mut self) -> String;

    /// Address the pending frame came from, when the transport knows it
    fn sender_address(&self) -> Option<NodeAddress>;

    /// Discard the pending frame
    fn flush(&mut self);
}
