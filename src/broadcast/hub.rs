use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::Broadcaster;
use crate::metrics;
use crate::EnrichedEvent;
use crate::FeedError;
use crate::UpdateMessage;

pub type SubscriberId = String;

/// Serialized outbound frame
pub type Frame = String;

/// Frames a subscriber may leave undrained before it is dropped
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Registry of live push-channel connections.
///
/// Each subscriber owns a bounded queue drained by its connection task. A
/// publish never waits on a queue: a dead peer, or one whose queue is full,
/// is dropped and delivery to the rest carries on.
#[derive(Debug)]
pub struct SubscriberHub {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Frame>>,
    queue_capacity: usize,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::with_queue_capacity(DEFAULT_SUBSCRIBER_QUEUE)
    }
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Registers a new connection and returns its id and frame receiver.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Frame>) {
        let id = nanoid::nanoid!();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.subscribers.insert(id.clone(), tx);
        metrics::SUBSCRIBERS.set(self.subscribers.len() as i64);
        debug!(subscriber_id = %id, total = self.subscribers.len(), "subscriber connected");
        (id, rx)
    }

    pub fn unregister(
        &self,
        id: &str,
    ) {
        if self.subscribers.remove(id).is_some() {
            metrics::SUBSCRIBERS.set(self.subscribers.len() as i64);
            debug!(subscriber_id = %id, total = self.subscribers.len(), "subscriber disconnected");
        }
    }

    /// Drops every sender; each connection task drains its queue, sees it end
    /// and closes.
    pub fn close_all(&self) {
        let count = self.subscribers.len();
        self.subscribers.clear();
        metrics::SUBSCRIBERS.set(0);
        debug!(closed = count, "all subscribers closed");
    }

    pub fn is_registered(
        &self,
        id: &str,
    ) -> bool {
        self.subscribers.contains_key(id)
    }

    fn send_to(
        &self,
        id: &str,
        tx: &mpsc::Sender<Frame>,
        frame: &Frame,
    ) -> Result<(), FeedError> {
        tx.try_send(frame.clone()).map_err(|e| match e {
            TrySendError::Full(_) => FeedError::SubscriberLagging {
                subscriber_id: id.to_string(),
                capacity: self.queue_capacity,
            },
            TrySendError::Closed(_) => FeedError::Publish {
                subscriber_id: id.to_string(),
            },
        })
    }
}

impl Broadcaster for SubscriberHub {
    fn publish(
        &self,
        batch: &[EnrichedEvent],
    ) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let frame = match serde_json::to_string(&UpdateMessage::db_update(batch)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode db_update frame: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for entry in self.subscribers.iter() {
            match self.send_to(entry.key(), entry.value(), &frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("{}", e);
                    dropped.push(entry.key().clone());
                }
            }
        }

        // Removal happens after iteration; DashMap shards are still read-locked inside the loop.
        for id in dropped {
            self.unregister(&id);
        }

        metrics::BATCHES_PUBLISHED.inc();
        debug!(events = batch.len(), subscribers = delivered, "db_update published");
        delivered
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
