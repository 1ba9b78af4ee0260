/// Receiver module - receive dispatch and the single-slot event buffer
///
/// One event is buffered at a time. Until the application reads or flushes
/// it, `available_event` keeps reporting it and neither loopback events nor
/// the transport are polled.
use crate::ack_manager::AckManager;
use crate::contracts::{truncate_text, EnqueueStatus, NodeAddress, ReceivedEvent, RetryPolicy};
use crate::errors::{RelayError, Result};
use crate::event_id::EventIdAllocator;
use crate::relay::EventQueue;
use crate::transport::Transport;

impl EventQueue {
    /// Buffer the next event for the application and return its length
    ///
    /// Loopback events are served first, newest first, without touching the
    /// transport. Keepalives and acks are consumed silently, as are frames
    /// from non-nodes while receive-nodes-only is on. Returns 0 when nothing
    /// is available for the application.
    pub fn available_event<T: Transport>(&mut self, transport: &mut T, now_ms: u64) -> usize {
        if let Some(length) = self.received_pending {
            return length;
        }

        if let Some(event) = self
            .outbound
            .newest_loopback()
            .and_then(|slot| self.outbound.remove(slot))
        {
            tracing::trace!(event_id = event.event_id, "serving loopback event");
            return self.buffer(ReceivedEvent {
                event: event.event,
                payload: event.payload,
                event_id: Some(event.event_id),
                sender: Some(event.target),
            });
        }

        if transport.poll_incoming().is_none() {
            return 0;
        }
        self.nodes.touch_device(now_ms);

        let sender = transport.sender_address();
        match sender.and_then(|address| self.nodes.get_node(address)) {
            Some(node) => self.nodes.touch(node, now_ms),
            None if self.config.receive_nodes_only => {
                tracing::trace!(?sender, "dropping frame from non-node");
                transport.flush();
                return 0;
            }
            None => {}
        }

        let event = transport.read_event();
        if self.config.keepalive_event.as_deref() == Some(event.as_str()) {
            tracing::trace!(?sender, "keepalive received");
            transport.flush();
            return 0;
        }

        let raw_payload = transport.read_payload();
        transport.flush();
        let (event_id, payload) = EventIdAllocator::split_payload(&raw_payload);

        if self.config.ack_event.as_deref() == Some(event.as_str()) {
            if AckManager::release(&mut self.outbound, payload).is_none() {
                tracing::trace!(payload, "ack matched no queued event");
            }
            return 0;
        }

        self.buffer(ReceivedEvent {
            event: truncate_text(&event, self.config.receive_event_length_max),
            payload: truncate_text(payload, self.config.receive_payload_length_max),
            event_id,
            sender,
        })
    }

    fn buffer(&mut self, received: ReceivedEvent) -> usize {
        let length = received.event.len();
        self.received = received;
        self.received_pending = Some(length);
        length
    }

    /// Length of the buffered payload
    pub fn available_payload(&self) -> usize {
        self.received.payload.len()
    }

    /// Take the buffered event name, allowing the next event to be received
    pub fn read_event(&mut self) -> String {
        self.received_pending = None;
        self.received.event.clone()
    }

    pub fn read_payload(&self) -> &str {
        &self.received.payload
    }

    /// Event id the sender attached to the buffered event
    pub fn received_event_id(&self) -> Option<u8> {
        self.received.event_id
    }

    pub fn received_sender(&self) -> Option<NodeAddress> {
        self.received.sender
    }

    /// Drop the buffered event without reading it
    pub fn flush_receiver(&mut self) {
        self.received = ReceivedEvent::default();
        self.received_pending = None;
    }

    /// Queue an ack for the buffered event back to its sender
    ///
    /// # Errors
    /// Returns `ConfirmWithoutAck` if no ack event is configured and
    /// `NothingToAcknowledge` if no event with a sender and id is buffered.
    pub fn acknowledge(&mut self, port: u16, now_ms: u64) -> Result<EnqueueStatus> {
        let ack_event = self
            .config
            .ack_event
            .clone()
            .ok_or(RelayError::ConfirmWithoutAck)?;
        let (Some(sender), Some(event_id)) = (self.received.sender, self.received.event_id) else {
            return Err(RelayError::NothingToAcknowledge);
        };
        self.queue(sender, port, &ack_event, &event_id.to_string(), RetryPolicy::Once, now_ms)
    }
}
