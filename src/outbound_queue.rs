/// Outbound queue - fixed slot arena plus a FIFO order index
///
/// Slots give direct access for removal by slot (ack matching, dead node
/// eviction). The order index lists occupied slots from oldest to newest
/// and drives both "oldest new event first" dispatch and the round-robin
/// resend cursor. Both vectors are allocated once at construction.
///
/// The `new_count` newest entries of the order index have never been
/// picked by the dispatcher. Removal keeps that tail invariant.
use crate::contracts::{NodeAddress, QueuedEvent, RetryPolicy};
use crate::errors::{RelayError, Result};
use crate::event_id::EventIdAllocator;

/// Where an inserted event landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    pub slot: usize,
    pub event_id: u8,
    /// The oldest entry was evicted to make room
    pub evicted: bool,
}

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    slots: Vec<Option<QueuedEvent>>,
    order: Vec<usize>,
    /// Order index position of the last round-robin pick
    cursor: usize,
    new_count: usize,
    loopback_count: usize,
    overflowed: bool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            order: Vec::with_capacity(capacity),
            cursor: 0,
            new_count: 0,
            loopback_count: 0,
            overflowed: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() == self.slots.len()
    }

    /// Number of entries not yet picked by the dispatcher
    pub fn new_count(&self) -> usize {
        self.new_count
    }

    /// Number of entries addressed to this device
    pub fn loopback_count(&self) -> usize {
        self.loopback_count
    }

    pub fn get(&self, slot: usize) -> Option<&QueuedEvent> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Queued events from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &QueuedEvent> + '_ {
        self.order.iter().filter_map(move |&slot| self.get(slot))
    }

    /// Insert a new event at the tail of the order index
    ///
    /// A full queue evicts its oldest entry first and raises the sticky
    /// overflow flag.
    pub fn insert(
        &mut self,
        target: NodeAddress,
        port: u16,
        event: String,
        payload: String,
        policy: RetryPolicy,
        loopback: bool,
    ) -> Result<Insertion> {
        let evicted = self.is_full();
        if evicted {
            let oldest = self.order[0];
            if let Some(dropped) = self.remove(oldest) {
                tracing::warn!(
                    event_id = dropped.event_id,
                    event = %dropped.event,
                    target = %dropped.target,
                    "queue overflow, evicted oldest event"
                );
            }
            self.overflowed = true;
        }

        let event_id = EventIdAllocator::allocate(self.slots.iter().flatten().map(|e| e.event_id))
            .ok_or(RelayError::EventIdExhausted)?;
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RelayError::EventIdExhausted)?;

        self.slots[slot] = Some(QueuedEvent {
            target,
            port,
            event,
            payload,
            event_id,
            policy,
            loopback,
        });
        self.order.push(slot);
        self.new_count += 1;
        if loopback {
            self.loopback_count += 1;
        }

        Ok(Insertion { slot, event_id, evicted })
    }

    /// Remove the event in `slot`, compacting the order index
    ///
    /// The round-robin cursor keeps pointing at the same "next to send"
    /// entry across the removal.
    pub fn remove(&mut self, slot: usize) -> Option<QueuedEvent> {
        let event = self.slots.get_mut(slot)?.take()?;
        if event.loopback {
            self.loopback_count = self.loopback_count.saturating_sub(1);
        }

        if let Some(position) = self.order.iter().position(|&s| s == slot) {
            if position >= self.order.len() - self.new_count {
                self.new_count -= 1;
            }
            self.order.remove(position);

            if self.order.is_empty() {
                self.cursor = 0;
            } else if self.cursor >= position {
                self.cursor = match self.cursor {
                    0 => self.order.len() - 1,
                    cursor => cursor - 1,
                };
            }
        }

        Some(event)
    }

    /// Pick the oldest entry the dispatcher has not seen yet
    pub fn take_oldest_new(&mut self) -> Option<usize> {
        if self.new_count == 0 {
            return None;
        }
        let slot = self.order[self.order.len() - self.new_count];
        self.new_count -= 1;
        Some(slot)
    }

    /// Move the round-robin cursor to the next entry, wrapping to the oldest
    pub fn advance_cursor(&mut self) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        self.cursor = if self.cursor + 1 >= self.order.len() {
            0
        } else {
            self.cursor + 1
        };
        Some(self.order[self.cursor])
    }

    /// Slot of the queued `Confirm` event carrying `event_id`
    pub fn find_confirm(&self, event_id: u8) -> Option<usize> {
        self.order.iter().copied().find(|&slot| {
            self.get(slot)
                .map(|e| e.event_id == event_id && e.policy == RetryPolicy::Confirm)
                .unwrap_or(false)
        })
    }

    /// Slot of the most recently queued loopback event
    pub fn newest_loopback(&self) -> Option<usize> {
        if self.loopback_count == 0 {
            return None;
        }
        self.order
            .iter()
            .rev()
            .copied()
            .find(|&slot| self.get(slot).map(|e| e.loopback).unwrap_or(false))
    }

    /// Read and clear the overflow flag
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }

    /// Drop every queued event
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.order.clear();
        self.cursor = 0;
        self.new_count = 0;
        self.loopback_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: NodeAddress = NodeAddress::new(10, 0, 0, 2);

    fn push(queue: &mut OutboundQueue, event: &str, policy: RetryPolicy) -> Insertion {
        queue
            .insert(TARGET, 8888, event.to_string(), String::new(), policy, false)
            .unwrap()
    }

    fn events(queue: &OutboundQueue) -> Vec<&str> {
        queue.iter().map(|e| e.event.as_str()).collect()
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut queue = OutboundQueue::new(3);
        for name in ["A", "B", "C"] {
            assert!(!push(&mut queue, name, RetryPolicy::Once).evicted);
        }
        assert!(!queue.take_overflow());

        let insertion = push(&mut queue, "D", RetryPolicy::Once);
        assert!(insertion.evicted);
        assert_eq!(events(&queue), vec!["B", "C", "D"]);
        assert_eq!(queue.new_count(), 3);

        assert!(queue.take_overflow());
        assert!(!queue.take_overflow());
    }

    #[test]
    fn test_event_ids_unique() {
        let mut queue = OutboundQueue::new(90);
        for n in 0..90 {
            let insertion = push(&mut queue, &n.to_string(), RetryPolicy::Once);
            assert_eq!(insertion.event_id, 10 + n as u8);
        }
        let mut ids: Vec<u8> = queue.iter().map(|e| e.event_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 90);

        // an overflow insert reuses the evicted id
        let insertion = push(&mut queue, "late", RetryPolicy::Once);
        assert!(insertion.evicted);
        assert_eq!(insertion.event_id, 10);
    }

    #[test]
    fn test_freed_slot_and_id_reused() {
        let mut queue = OutboundQueue::new(4);
        let a = push(&mut queue, "A", RetryPolicy::Once);
        let b = push(&mut queue, "B", RetryPolicy::Once);
        push(&mut queue, "C", RetryPolicy::Once);

        queue.remove(b.slot);
        let d = push(&mut queue, "D", RetryPolicy::Once);
        assert_eq!(d.slot, b.slot);
        assert_eq!(d.event_id, b.event_id);
        assert_eq!(events(&queue), vec!["A", "C", "D"]);
        assert_ne!(a.event_id, d.event_id);
    }

    #[test]
    fn test_new_entries_taken_oldest_first() {
        let mut queue = OutboundQueue::new(4);
        let a = push(&mut queue, "A", RetryPolicy::Once);
        let b = push(&mut queue, "B", RetryPolicy::Once);

        assert_eq!(queue.take_oldest_new(), Some(a.slot));
        assert_eq!(queue.take_oldest_new(), Some(b.slot));
        assert_eq!(queue.take_oldest_new(), None);
    }

    #[test]
    fn test_removing_new_entry_updates_new_count() {
        let mut queue = OutboundQueue::new(4);
        let a = push(&mut queue, "A", RetryPolicy::Confirm);
        let b = push(&mut queue, "B", RetryPolicy::Once);
        let c = push(&mut queue, "C", RetryPolicy::Once);
        assert_eq!(queue.take_oldest_new(), Some(a.slot));
        assert_eq!(queue.new_count(), 2);

        // A was already picked, removing it leaves the new tail alone
        queue.remove(a.slot);
        assert_eq!(queue.new_count(), 2);

        queue.remove(b.slot);
        assert_eq!(queue.new_count(), 1);
        assert_eq!(queue.take_oldest_new(), Some(c.slot));
    }

    #[test]
    fn test_round_robin_wraps() {
        let mut queue = OutboundQueue::new(3);
        let a = push(&mut queue, "A", RetryPolicy::Confirm);
        let b = push(&mut queue, "B", RetryPolicy::Confirm);
        let c = push(&mut queue, "C", RetryPolicy::Confirm);
        while queue.take_oldest_new().is_some() {}

        assert_eq!(queue.advance_cursor(), Some(b.slot));
        assert_eq!(queue.advance_cursor(), Some(c.slot));
        assert_eq!(queue.advance_cursor(), Some(a.slot));
    }

    #[test]
    fn test_removal_keeps_cursor_stable() {
        let mut queue = OutboundQueue::new(4);
        let a = push(&mut queue, "A", RetryPolicy::Confirm);
        let b = push(&mut queue, "B", RetryPolicy::Confirm);
        let c = push(&mut queue, "C", RetryPolicy::Confirm);
        let d = push(&mut queue, "D", RetryPolicy::Confirm);
        while queue.take_oldest_new().is_some() {}

        // cursor on B, next to send is C
        assert_eq!(queue.advance_cursor(), Some(b.slot));
        queue.remove(a.slot);
        assert_eq!(queue.advance_cursor(), Some(c.slot));

        // removing the entry under the cursor, next to send is still D
        queue.remove(c.slot);
        assert_eq!(queue.advance_cursor(), Some(d.slot));
        assert_eq!(queue.advance_cursor(), Some(b.slot));
    }

    #[test]
    fn test_removal_at_cursor_zero_wraps_to_last() {
        let mut queue = OutboundQueue::new(3);
        let a = push(&mut queue, "A", RetryPolicy::Confirm);
        let b = push(&mut queue, "B", RetryPolicy::Confirm);
        let c = push(&mut queue, "C", RetryPolicy::Confirm);
        while queue.take_oldest_new().is_some() {}

        assert_eq!(queue.advance_cursor(), Some(b.slot));
        assert_eq!(queue.advance_cursor(), Some(c.slot));
        assert_eq!(queue.advance_cursor(), Some(a.slot));

        queue.remove(a.slot);
        assert_eq!(queue.advance_cursor(), Some(b.slot));
    }

    #[test]
    fn test_loopback_tracking() {
        let mut queue = OutboundQueue::new(4);
        push(&mut queue, "A", RetryPolicy::Once);
        let self_a = queue
            .insert(TARGET, 0, "L1".into(), String::new(), RetryPolicy::Once, true)
            .unwrap();
        let self_b = queue
            .insert(TARGET, 0, "L2".into(), String::new(), RetryPolicy::Once, true)
            .unwrap();
        assert_eq!(queue.loopback_count(), 2);
        assert_eq!(queue.newest_loopback(), Some(self_b.slot));

        queue.remove(self_b.slot);
        assert_eq!(queue.loopback_count(), 1);
        assert_eq!(queue.newest_loopback(), Some(self_a.slot));
    }

    #[test]
    fn test_find_confirm_ignores_other_policies() {
        let mut queue = OutboundQueue::new(4);
        let once = push(&mut queue, "A", RetryPolicy::Once);
        let confirm = push(&mut queue, "B", RetryPolicy::Confirm);

        assert_eq!(queue.find_confirm(once.event_id), None);
        assert_eq!(queue.find_confirm(confirm.event_id), Some(confirm.slot));
    }

    #[test]
    fn test_clear() {
        let mut queue = OutboundQueue::new(2);
        push(&mut queue, "A", RetryPolicy::Once);
        queue
            .insert(TARGET, 0, "L".into(), String::new(), RetryPolicy::Once, true)
            .unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.new_count(), 0);
        assert_eq!(queue.loopback_count(), 0);
        assert_eq!(queue.take_oldest_new(), None);
        assert_eq!(push(&mut queue, "B", RetryPolicy::Once).event_id, 10);
    }
}
