/// UDP transport
///
/// One datagram carries one frame. Frames are rkyv archives validated with
/// bytecheck on receipt, carry the wire version and a CRC32 of event and
/// payload, and can be authenticated with a BLAKE2s keyed MAC shared by all
/// nodes. Frames that fail any check are dropped.
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};

use blake2::digest::{KeyInit, Mac};
use blake2::Blake2sMac256;
use rkyv::{check_archived_root, to_bytes, AlignedVec, Archive, Deserialize, Serialize};

use crate::contracts::NodeAddress;
use crate::errors::{RelayError, Result};
use crate::transport::Transport;

/// Length of the frame authentication tag
pub const TAG_LENGTH: usize = 32;

/// Wire frame carried in a single datagram
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct WireFrame {
    /// `RELAY_VERSION` of the sender
    pub version: u16,

    pub event: String,

    /// Raw payload, event id prefix included
    pub payload: String,

    /// CRC32 over event and payload
    pub crc: u32,

    /// Keyed MAC over event and payload, when a key is configured
    pub tag: Option<[u8; TAG_LENGTH]>,
}

#[derive(Debug)]
struct PendingFrame {
    event: String,
    payload: String,
    sender: Option<NodeAddress>,
}

/// Non-blocking UDP transport
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    buffer: Vec<u8>,
    key: Option<Vec<u8>>,
    pending: Option<PendingFrame>,
}

impl UdpTransport {
    /// Bind a non-blocking socket
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(address)?;
        Self::from_socket(socket)
    }

    /// Wrap an existing socket, switching it to non-blocking mode
    pub fn from_socket(socket: UdpSocket) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            buffer: vec![0u8; crate::MAX_FRAME_SIZE],
            key: None,
            pending: None,
        })
    }

    /// Authenticate frames with a shared key of 1 to 32 bytes
    pub fn with_key(mut self, key: &[u8]) -> Result<Self> {
        if key.is_empty() || key.len() > TAG_LENGTH {
            return Err(RelayError::AuthenticationFailed);
        }
        self.key = Some(key.to_vec());
        Ok(self)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn checksum(event: &str, payload: &str) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(event.as_bytes());
        hasher.update(&[0]);
        hasher.update(payload.as_bytes());
        hasher.finalize()
    }

    fn mac(key: &[u8], event: &str, payload: &str) -> Result<Blake2sMac256> {
        let mut mac = <Blake2sMac256 as KeyInit>::new_from_slice(key)
            .map_err(|_| RelayError::AuthenticationFailed)?;
        mac.update(&(event.len() as u32).to_le_bytes());
        mac.update(event.as_bytes());
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Build and serialize the frame for `event` and `payload`
    pub fn encode_frame(&self, event: &str, payload: &str) -> Result<AlignedVec> {
        let tag = match &self.key {
            Some(key) => Some(Self::mac(key, event, payload)?.finalize().into_bytes().into()),
            None => None,
        };
        let frame = WireFrame {
            version: crate::RELAY_VERSION,
            event: event.to_string(),
            payload: payload.to_string(),
            crc: Self::checksum(event, payload),
            tag,
        };

        let bytes = to_bytes::<_, 256>(&frame)
            .map_err(|_| RelayError::Serialization("Failed to serialize frame".to_string()))?;
        if bytes.len() > crate::MAX_FRAME_SIZE {
            return Err(RelayError::FrameTooLarge {
                required: bytes.len(),
                available: crate::MAX_FRAME_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Validate a received datagram and extract event and payload
    pub fn decode_frame(&self, bytes: &[u8]) -> Result<(String, String)> {
        let mut aligned = AlignedVec::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = check_archived_root::<WireFrame>(&aligned[..]).map_err(|_| {
            RelayError::Deserialization("Failed to validate frame structure".to_string())
        })?;
        if archived.version != crate::RELAY_VERSION {
            return Err(RelayError::UnsupportedVersion(archived.version));
        }
        let event = archived.event.as_str();
        let payload = archived.payload.as_str();

        let actual = Self::checksum(event, payload);
        if archived.crc != actual {
            return Err(RelayError::IntegrityCheckFailed {
                expected: archived.crc,
                actual,
            });
        }

        if let Some(key) = &self.key {
            let tag = archived.tag.as_ref().ok_or(RelayError::AuthenticationFailed)?;
            Self::mac(key, event, payload)?
                .verify_slice(&tag[..])
                .map_err(|_| RelayError::AuthenticationFailed)?;
        }

        Ok((event.to_string(), payload.to_string()))
    }

    fn sender(address: SocketAddr) -> Option<NodeAddress> {
        match address.ip() {
            IpAddr::V4(ip) => Some(ip.into()),
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map(NodeAddress::from),
        }
    }

    fn receive_next(&mut self) -> Option<PendingFrame> {
        loop {
            let (length, from) = match self.socket.recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "udp receive failed");
                    return None;
                }
            };

            match self.decode_frame(&self.buffer[..length]) {
                Ok((event, payload)) => {
                    return Some(PendingFrame {
                        event,
                        payload,
                        sender: Self::sender(from),
                    })
                }
                Err(e) => tracing::warn!(%from, error = %e, "dropping invalid frame"),
            }
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, target: NodeAddress, port: u16, event: &str, payload: &str) -> Result<usize> {
        let bytes = self.encode_frame(event, payload)?;
        let destination = SocketAddr::from((std::net::Ipv4Addr::from(target), port));
        Ok(self.socket.send_to(&bytes, destination)?)
    }

    fn poll_incoming(&mut self) -> Option<usize> {
        if self.pending.is_none() {
            self.pending = self.receive_next();
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
        self.pending.as_ref().and_then(|frame| frame.sender)
    }

    fn flush(&mut self) {
        self.pending = None;
    }
}
