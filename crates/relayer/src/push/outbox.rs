//! Per-session outbound queue (spec §4.5 backpressure: "on a full buffer for a slow
//! consumer, drop the oldest event and log"). A bounded `mpsc::Sender` can only refuse
//! to enqueue the newest item on a full buffer — it has no way to reach back and drop
//! something already queued. A `VecDeque` guarded by a plain mutex can, so the session
//! write loop reads from this instead of a channel; sends (from the `Hub` and from the
//! session's own keepalive/pong replies) go through the same non-blocking `push`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use super::{ServerEvent, SESSION_BUFFER_SIZE};

#[derive(Clone)]
pub struct Outbox {
    queue: Arc<Mutex<VecDeque<ServerEvent>>>,
    notify: Arc<Notify>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(SESSION_BUFFER_SIZE))),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Never blocks. `session_id` is only for the drop log line.
    pub fn push(&self, session_id: Uuid, event: ServerEvent) {
        let mut queue = self.queue.lock().expect("outbox mutex poisoned");
        if queue.len() >= SESSION_BUFFER_SIZE {
            queue.pop_front();
            warn!(session_id = %session_id, "session send buffer full, dropping oldest queued event");
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    /// Waits for and pops the oldest queued event.
    pub async fn recv(&self) -> ServerEvent {
        loop {
            if let Some(event) = self.queue.lock().expect("outbox mutex poisoned").pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_recv_round_trips() {
        let outbox = Outbox::new();
        outbox.push(Uuid::nil(), ServerEvent::Ping);
        assert!(matches!(outbox.recv().await, ServerEvent::Ping));
    }

    #[tokio::test]
    async fn full_buffer_drops_oldest_not_newest() {
        let outbox = Outbox::new();
        for _ in 0..SESSION_BUFFER_SIZE {
            outbox.push(Uuid::nil(), ServerEvent::Ping);
        }
        // One more push should evict the oldest Ping and queue this Pong.
        outbox.push(Uuid::nil(), ServerEvent::Pong);

        let mut saw_pong = false;
        for _ in 0..SESSION_BUFFER_SIZE {
            if matches!(outbox.recv().await, ServerEvent::Pong) {
                saw_pong = true;
            }
        }
        assert!(saw_pong, "newest event must survive eviction");
    }
}
