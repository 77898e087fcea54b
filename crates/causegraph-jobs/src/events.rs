//! Job event rooms
//!
//! Every job id has its own room of subscribers. Events emitted for a job
//! are fanned out to that room only. Delivery is best-effort: a closed
//! subscriber is pruned on the next broadcast, and broadcasting to an empty
//! room does nothing.
//!
//! Author: hephaex@gmail.com

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use causegraph_core::{EventSink, JobEvent};

type Room = HashMap<u64, mpsc::UnboundedSender<JobEvent>>;

/// A client's membership in one job room
#[derive(Debug)]
pub struct Subscription {
    pub job_id: Uuid,
    pub subscriber_id: u64,
    receiver: mpsc::UnboundedReceiver<JobEvent>,
}

impl Subscription {
    /// Next event; `None` once the room is closed and drained
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<JobEvent> {
        self.receiver
    }
}

/// Registry of per-job subscriber rooms
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    rooms: RwLock<HashMap<Uuid, Room>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a job's room. Only events emitted after this call are received.
    pub fn subscribe(&self, job_id: Uuid) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id)
            .or_default()
            .insert(subscriber_id, sender);

        tracing::debug!(%job_id, subscriber_id, "Subscriber joined");
        Subscription {
            job_id,
            subscriber_id,
            receiver,
        }
    }

    /// Leave a job's room. Returns false if the subscriber was not a member.
    pub fn unsubscribe(&self, job_id: Uuid, subscriber_id: u64) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(room) = rooms.get_mut(&job_id) else {
            return false;
        };

        let removed = room.remove(&subscriber_id).is_some();
        if room.is_empty() {
            rooms.remove(&job_id);
        }
        if removed {
            tracing::debug!(%job_id, subscriber_id, "Subscriber left");
        }
        removed
    }

    /// Fan an event out to the job's room, returning how many subscribers
    /// received it.
    pub fn broadcast(&self, event: &JobEvent) -> usize {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(room) = rooms.get_mut(&event.job_id) else {
            return 0;
        };

        room.retain(|_, sender| sender.send(event.clone()).is_ok());
        let delivered = room.len();
        if room.is_empty() {
            rooms.remove(&event.job_id);
        }
        delivered
    }

    /// Drop a job's room. Subscribers still drain what was already sent.
    pub fn close(&self, job_id: Uuid) {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .map_or(0, HashMap::len)
    }
}

impl EventSink for SubscriptionRegistry {
    fn emit(&self, event: JobEvent) {
        let delivered = self.broadcast(&event);
        tracing::trace!(
            job_id = %event.job_id,
            status = %event.status,
            progress = event.progress,
            delivered,
            "Event broadcast"
        );
        // Nothing follows a terminal event
        if event.is_terminal() {
            self.close(event.job_id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
