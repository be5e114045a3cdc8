//! In-memory topic broker
//!
//! One broadcast channel per topic path. Delivery order on a topic equals
//! publish order; nothing is promised across topics. A topic exists only
//! while it has at least one receiver.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error};

use super::protocol::{RoomId, Topic};

/// Per-topic buffer before slow subscribers start lagging
const TOPIC_CAPACITY: usize = 128;

type TopicMap = DashMap<String, broadcast::Sender<Value>>;

pub struct Broker {
    topics: Arc<TopicMap>,
}

/// Receiving end of one subscription. Dropping the last receiver of a topic
/// removes the topic.
pub struct TopicReceiver {
    rx: Option<broadcast::Receiver<Value>>,
    path: String,
    topics: Arc<TopicMap>,
}

impl TopicReceiver {
    pub async fn recv(&mut self) -> Result<Value, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }
}

impl Drop for TopicReceiver {
    fn drop(&mut self) {
        drop(self.rx.take());
        let pruned = self
            .topics
            .remove_if(&self.path, |_, sender| sender.receiver_count() == 0)
            .is_some();
        if pruned {
            debug!(topic = %self.path, "Topic pruned");
        }
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
        }
    }

    /// Register a receiver. It sees every message published after this call.
    pub fn subscribe(&self, topic: &Topic) -> TopicReceiver {
        let path = topic.path();
        let rx = self
            .topics
            .entry(path.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();
        TopicReceiver {
            rx: Some(rx),
            path,
            topics: Arc::clone(&self.topics),
        }
    }

    /// Publish to every current subscriber; returns how many received it
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &Topic, payload: &T) -> usize {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to encode topic payload");
                return 0;
            }
        };

        match self.topics.get(&topic.path()) {
            Some(sender) => sender.send(body).unwrap_or(0),
            None => {
                debug!(topic = %topic, "Publish with no subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(&topic.path())
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop every topic scoped to a room. Live receivers observe the channel
    /// closing, which ends their forwarders.
    pub fn forget_room(&self, room_id: RoomId) {
        for topic in Topic::room_topics(room_id) {
            self.topics.remove(&topic.path());
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
