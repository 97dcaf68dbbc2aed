//! Broadcast channel adapter for co-located listeners.
//!
//! Every published payload is forwarded to a topic named after its event
//! type. Each topic is a `tokio::sync::broadcast` channel created lazily on
//! first subscribe. Delivery is fire-and-forget: a payload broadcast while
//! no listener is attached is dropped, and there is no replay buffer for
//! late subscribers. This path never replaces webhook delivery.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

/// Default per-topic buffer capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Per-topic in-process fan-out.
///
/// One instance per process, shared via `Arc<BroadcastChannel>` and owned by
/// the composition root.
pub struct BroadcastChannel {
    topics: RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>,
    capacity: usize,
}

impl BroadcastChannel {
    /// Create a channel whose topics buffer `capacity` payloads each.
    ///
    /// When a topic buffer is full the oldest payload is dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Attach a listener to `topic`. Only payloads broadcast after this call
    /// are received.
    ///
    /// Creating a new topic prunes every topic left without listeners.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        if let Some(sender) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return sender.subscribe();
        }

        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        // Topics whose listeners all went away are dropped here as well as on
        // broadcast, so listeners that never see a publish cannot pile up.
        topics.retain(|_, sender| sender.receiver_count() > 0);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Forward `payload` to every listener currently attached to `topic`.
    ///
    /// Returns how many listeners it reached. Topics whose listeners have
    /// all gone away are pruned.
    pub fn broadcast(&self, topic: &str, payload: &serde_json::Value) -> usize {
        let outcome = {
            let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
            topics.get(topic).map(|sender| sender.send(payload.clone()))
        };

        match outcome {
            Some(Ok(reached)) => reached,
            Some(Err(_)) => {
                // Zero receivers: drop the topic unless someone re-subscribed
                // in between.
                let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
                if topics
                    .get(topic)
                    .is_some_and(|sender| sender.receiver_count() == 0)
                {
                    topics.remove(topic);
                }
                tracing::debug!(topic, "Broadcast dropped, no listeners");
                0
            }
            None => 0,
        }
    }

    /// Number of topics with a live channel.
    pub fn topic_count(&self) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn listener_receives_payload_on_its_topic() {
        let channel = BroadcastChannel::default();
        let mut rx = channel.subscribe("goal.created");

        let reached = channel.broadcast("goal.created", &json!({"goal_id": "g1"}));
        assert_eq!(reached, 1);

        let payload = rx.recv().await.expect("should receive the payload");
        assert_eq!(payload, json!({"goal_id": "g1"}));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let channel = BroadcastChannel::default();
        let mut goals = channel.subscribe("goal.created");
        let _roles = channel.subscribe("role.created");

        channel.broadcast("role.created", &json!({"role_id": "r1"}));
        assert!(goals.try_recv().is_err());
    }

    #[tokio::test]
    async fn multiple_listeners_receive_same_payload() {
        let channel = BroadcastChannel::default();
        let mut rx1 = channel.subscribe("driver.updated");
        let mut rx2 = channel.subscribe("driver.updated");

        assert_eq!(channel.broadcast("driver.updated", &json!({"n": 1})), 2);
        assert_eq!(rx1.recv().await.unwrap()["n"], 1);
        assert_eq!(rx2.recv().await.unwrap()["n"], 1);
    }

    #[test]
    fn broadcast_without_listeners_does_not_panic() {
        let channel = BroadcastChannel::default();
        assert_eq!(channel.broadcast("orphan.event", &json!({})), 0);
        assert_eq!(channel.topic_count(), 0);
    }

    #[test]
    fn late_subscriber_sees_no_replay() {
        let channel = BroadcastChannel::default();
        let early = channel.subscribe("goal.created");
        channel.broadcast("goal.created", &json!({"seq": 1}));

        let mut late = channel.subscribe("goal.created");
        assert!(late.try_recv().is_err());
        drop(early);
    }

    #[test]
    fn abandoned_topic_is_pruned() {
        let channel = BroadcastChannel::default();
        let rx = channel.subscribe("goal.deleted");
        assert_eq!(channel.topic_count(), 1);
        drop(rx);

        channel.broadcast("goal.deleted", &json!({}));
        assert_eq!(channel.topic_count(), 0);
    }

    #[test]
    fn abandoned_topics_without_broadcasts_do_not_accumulate() {
        let channel = BroadcastChannel::default();
        for i in 0..1000 {
            drop(channel.subscribe(&format!("topic.{i}")));
        }
        assert_eq!(channel.topic_count(), 1);

        let _live = channel.subscribe("goal.created");
        assert_eq!(channel.topic_count(), 1);
    }

    #[test]
    fn pruning_keeps_topics_with_listeners() {
        let channel = BroadcastChannel::default();
        let mut goals = channel.subscribe("goal.created");
        drop(channel.subscribe("goal.deleted"));
        let _roles = channel.subscribe("role.created");

        assert_eq!(channel.topic_count(), 2);
        assert_eq!(channel.broadcast("goal.created", &json!({"n": 1})), 1);
        assert_eq!(goals.try_recv().unwrap()["n"], 1);
    }
}
