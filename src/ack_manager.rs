/// ACK Manager module - retry policy outcomes and ack correlation
///
/// `Confirm` events stay queued and are resent on the resend timer until an
/// ack event carrying their id comes back. All other policies are settled
/// by a single send attempt, whatever its outcome.
use crate::contracts::{QueuedEvent, RetryPolicy};
use crate::event_id::EventIdAllocator;
use crate::outbound_queue::OutboundQueue;

/// What to do with a queued event after a send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Remove,
    Keep,
}

/// ACK Manager - stateless policy decisions for the dispatchers
pub struct AckManager;

impl AckManager {
    /// Decide the fate of an event after a send attempt
    pub fn after_send(policy: RetryPolicy, delivered: bool) -> Disposition {
        match (policy, delivered) {
            (RetryPolicy::Confirm, _) => Disposition::Keep,
            (RetryPolicy::Once | RetryPolicy::Repeat | RetryPolicy::OverrideTimeout, _) => {
                Disposition::Remove
            }
        }
    }

    /// True if the policy ignores the target's timeout state
    pub fn overrides_timeout(policy: RetryPolicy) -> bool {
        policy == RetryPolicy::OverrideTimeout
    }

    /// Parse the acknowledged event id out of an ack payload
    pub fn parse_ack(payload: &str) -> Option<u8> {
        EventIdAllocator::parse_id(payload.trim())
    }

    /// Release the queued `Confirm` event acknowledged by `payload`
    pub fn release(queue: &mut OutboundQueue, payload: &str) -> Option<QueuedEvent> {
        let event_id = Self::parse_ack(payload)?;
        let slot = queue.find_confirm(event_id)?;
        let released = queue.remove(slot)?;
        tracing::debug!(event_id, target = %released.target, "ack released event");
        Some(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::NodeAddress;

    #[test]
    fn test_policy_table() {
        use Disposition::*;
        use RetryPolicy::*;

        assert_eq!(AckManager::after_send(Once, true), Remove);
        assert_eq!(AckManager::after_send(Once, false), Remove);
        assert_eq!(AckManager::after_send(Repeat, true), Remove);
        assert_eq!(AckManager::after_send(Repeat, false), Remove);
        assert_eq!(AckManager::after_send(Confirm, true), Keep);
        assert_eq!(AckManager::after_send(Confirm, false), Keep);
        assert_eq!(AckManager::after_send(OverrideTimeout, true), Remove);
        assert_eq!(AckManager::after_send(OverrideTimeout, false), Remove);
    }

    #[test]
    fn test_parse_ack() {
        assert_eq!(AckManager::parse_ack("42"), Some(42));
        assert_eq!(AckManager::parse_ack(""), None);
        assert_eq!(AckManager::parse_ack("4x"), None);
        assert_eq!(AckManager::parse_ack(" 42 "), Some(42));
        assert_eq!(AckManager::parse_ack(" +5 "), None);
    }

    #[test]
    fn test_release_matches_only_confirm_id() {
        let target = NodeAddress::new(10, 0, 0, 2);
        let mut queue = OutboundQueue::new(4);
        let mut insert = |name: &str, policy| {
            queue
                .insert(target, 1, name.to_string(), String::new(), policy, false)
                .unwrap()
        };
        let first = insert("A", RetryPolicy::Confirm);
        let second = insert("B", RetryPolicy::Confirm);
        let once = insert("C", RetryPolicy::Once);

        assert!(AckManager::release(&mut queue, &once.event_id.to_string()).is_none());
        let released = AckManager::release(&mut queue, &second.event_id.to_string()).unwrap();
        assert_eq!(released.event, "B");
        assert_eq!(queue.len(), 2);
        assert!(queue.get(first.slot).is_some());

        // a repeated ack finds nothing
        assert!(AckManager::release(&mut queue, &second.event_id.to_string()).is_none());
    }
}
