/// Relay Queue Core - reliable event relay for small networked nodes
///
/// **Creator**: Shayan Golmezerji
/// **License**: Creative Commons Attribution 4.0 International (CC BY 4.0)
///
/// Applications queue short named events with a text payload for other
/// nodes. The queue sends them over a `Transport`, retries them according
/// to their `RetryPolicy`, tracks which nodes are alive from the traffic it
/// sees, and hands received events to the application one at a time.
///
/// # Design Principles
/// - Single owner, single thread: the application drives everything from
///   its control loop
/// - Time is always passed in as milliseconds, never read from a clock
/// - Fixed capacity, set once at construction
/// - Transport agnostic; UDP and in-memory transports are provided

pub mod ack_manager;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod event_id;
pub mod keepalive;
pub mod node_table;
pub mod outbound_queue;
pub mod receiver;
pub mod relay;
pub mod transmitter;
pub mod transport;

pub use config::QueueConfig;
pub use contracts::{EnqueueStatus, NodeAddress, NodeState, QueuedEvent, ReceivedEvent, RetryPolicy};
pub use errors::{RelayError, Result};
pub use relay::EventQueue;
pub use transport::{MemoryNetwork, MemoryTransport, Transport, UdpTransport};

/// Wire frame version
pub const RELAY_VERSION: u16 = 1;

/// Maximum encoded frame size (in bytes) - must fit in standard UDP MTU
pub const MAX_FRAME_SIZE: usize = 1024;

/// Default port used by the reference deployments
pub const DEFAULT_PORT: u16 = 8888;
