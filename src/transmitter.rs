/// Transmitter module - send dispatch for the outbound queue
///
/// Each `queue_handler` call sends at most one event. New events go out
/// oldest first as soon as they are queued; once none are left, the
/// round-robin cursor walks the queue on the resend timer so `Confirm`
/// events still waiting for their ack are retried in turn.
use crate::ack_manager::{AckManager, Disposition};
use crate::event_id::EventIdAllocator;
use crate::relay::EventQueue;
use crate::transport::Transport;

impl EventQueue {
    /// Send the next due event through `transport`
    ///
    /// Events addressed to timed out nodes are dropped while looking for a
    /// candidate, unless their policy is `OverrideTimeout`. Returns the
    /// outcome of the send attempt, or `true` if nothing needed sending.
    pub fn queue_handler<T: Transport>(&mut self, transport: &mut T, now_ms: u64) -> bool {
        let resend_due = now_ms.wrapping_sub(self.last_send_ms) > self.config.resend_delay_ms;
        if self.outbound.len() <= self.outbound.loopback_count()
            || (self.outbound.new_count() == 0 && !resend_due)
        {
            return true;
        }

        let Some(slot) = self.next_candidate(now_ms) else {
            return true;
        };
        let Some(event) = self.outbound.get(slot).cloned() else {
            return true;
        };

        let payload = EventIdAllocator::encode_payload(event.event_id, &event.payload);
        let delivered = match transport.send(event.target, event.port, &event.event, &payload) {
            Ok(written) => written > 0,
            Err(e) => {
                tracing::warn!(
                    event_id = event.event_id,
                    target = %event.target,
                    error = %e,
                    "send failed"
                );
                false
            }
        };

        if delivered {
            self.nodes.touch_device(now_ms);
            if let Some(node) = self.nodes.get_node(event.target) {
                self.nodes.touch(node, now_ms);
            }
        }

        tracing::debug!(
            event_id = event.event_id,
            event = %event.event,
            target = %event.target,
            delivered,
            "send attempt"
        );

        if AckManager::after_send(event.policy, delivered) == Disposition::Remove {
            self.outbound.remove(slot);
        }
        delivered
    }

    /// Pick the slot to send next, evicting events for dead nodes on the way
    fn next_candidate(&mut self, now_ms: u64) -> Option<usize> {
        for _ in 0..self.outbound.len() {
            let slot = match self.outbound.take_oldest_new() {
                Some(slot) => slot,
                None => {
                    self.last_send_ms = now_ms;
                    self.outbound.advance_cursor()?
                }
            };
            let event = self.outbound.get(slot)?;
            if event.loopback {
                continue;
            }

            match self.nodes.get_node(event.target) {
                // non-nodes never time out
                None => return Some(slot),
                Some(node)
                    if self.nodes.peek_state(node, now_ms)
                        || AckManager::overrides_timeout(event.policy) =>
                {
                    return Some(slot)
                }
                Some(_) => {
                    tracing::debug!(
                        event_id = event.event_id,
                        target = %event.target,
                        "dropping event for timed out node"
                    );
                    self.outbound.remove(slot);
                    if self.outbound.is_empty() {
                        return None;
                    }
                }
            }
        }
        None
    }
}
