/// Keepalive module - liveness events for nodes about to leave their window
use crate::contracts::RetryPolicy;
use crate::relay::EventQueue;

impl EventQueue {
    /// Queue a keepalive for every node that is close to timing out
    ///
    /// A node is due once it has been silent for longer than the node timeout
    /// minus the keepalive margin and no keepalive went to it within the
    /// keepalive resend delay. Keepalives use `OverrideTimeout`, so nodes that
    /// already timed out still get one. Does nothing if no keepalive event
    /// is configured. Returns the number of keepalives queued.
    pub fn send_keepalive(&mut self, port: u16, now_ms: u64) -> usize {
        let Some(event) = self.config.keepalive_event.clone() else {
            return 0;
        };

        let mut queued = 0;
        for node in self.nodes.keepalive_due(now_ms) {
            match self.queue_to_node(node, port, &event, "", RetryPolicy::OverrideTimeout, now_ms) {
                Ok(_) => queued += 1,
                Err(e) => tracing::warn!(node, error = %e, "failed to queue keepalive"),
            }
            self.nodes.mark_keepalive_sent(node, now_ms);
        }

        if queued > 0 {
            tracing::trace!(queued, "keepalives queued");
        }
        queued
    }
}
