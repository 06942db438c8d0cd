//! Topic subscription manager
//!
//! Owns the single active broker subscription and routes its messages into
//! the internal queue.
//!
//! ## Retopic fence
//! Every subscription is tagged with a generation number. The broker
//! callback takes the shared side of a gate and enqueues only while its
//! generation is still current. `retopic` advances the generation under the
//! exclusive side of the gate, which waits out any callback already
//! enqueuing. Once the generation has moved, callbacks of the old
//! subscription are no-ops, even if the broker keeps invoking them.
//!
//! A subscription the broker refused to drop is kept as orphaned and
//! released again on the next successful retopic or on `close`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use contracts::{MessageBroker, MessageCallback, RawMessage, SubscriptionToken, Topic};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{IngestionError, Result};
use crate::queue::MessageQueue;

#[derive(Debug, Default)]
struct Fence {
    gate: RwLock<()>,
    generation: AtomicU64,
}

impl Fence {
    /// Invalidate every callback handed out so far
    fn advance(&self) -> u64 {
        let _exclusive = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct ActiveSubscription {
    topic: Topic,
    token: SubscriptionToken,
}

/// Single-subscription manager
pub struct TopicSubscriptionManager {
    broker: Arc<dyn MessageBroker>,
    queue: Arc<MessageQueue>,
    fence: Arc<Fence>,
    active: Mutex<Option<ActiveSubscription>>,
    /// Muted subscriptions whose unsubscribe was rejected
    orphaned: Mutex<Vec<ActiveSubscription>>,
}

impl TopicSubscriptionManager {
    pub fn new(broker: Arc<dyn MessageBroker>, queue: Arc<MessageQueue>) -> Self {
        Self {
            broker,
            queue,
            fence: Arc::new(Fence::default()),
            active: Mutex::new(None),
            orphaned: Mutex::new(Vec::new()),
        }
    }

    /// Switch the active subscription to `topic`
    ///
    /// Retopic to the topic already active is a no-op. On failure no
    /// subscription is left active. A previous subscription the broker
    /// would not drop stays muted and is retried later.
    ///
    /// # Errors
    /// `UnsubscribeFailed` / `SubscribeFailed` from the broker, `EmptyTopic`.
    #[instrument(name = "subscription_retopic", skip(self), fields(topic = %topic))]
    pub fn retopic(&self, topic: &str) -> Result<()> {
        if topic.is_empty() {
            return Err(IngestionError::EmptyTopic);
        }

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if active.as_ref().is_some_and(|a| a.topic == topic) {
            debug!("already subscribed, retopic skipped");
            return Ok(());
        }

        let generation = self.fence.advance();

        if let Some(previous) = active.take() {
            if let Err(source) = self.broker.unsubscribe(previous.token) {
                warn!(old_topic = %previous.topic, error = %source, "unsubscribe failed");
                let topic = previous.topic.to_string();
                self.orphan(previous);
                return Err(IngestionError::UnsubscribeFailed { topic, source });
            }
            debug!(old_topic = %previous.topic, "unsubscribed");
        }

        let token = self
            .broker
            .subscribe(topic, self.callback(generation))
            .map_err(|source| {
                warn!(error = %source, "subscribe failed, no subscription active");
                IngestionError::SubscribeFailed {
                    topic: topic.to_string(),
                    source,
                }
            })?;

        *active = Some(ActiveSubscription {
            topic: Topic::new(topic),
            token,
        });
        metrics::counter!("mqtt_stream_retopics_total").increment(1);
        info!(generation, "subscribed");

        if let Err(e) = self.release_orphans() {
            debug!(error = %e, "orphaned subscription still held by broker");
        }
        Ok(())
    }

    /// Tear down the active subscription, if any
    #[instrument(name = "subscription_close", skip(self))]
    pub fn close(&self) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            self.fence.advance();
            if let Err(source) = self.broker.unsubscribe(previous.token) {
                let topic = previous.topic.to_string();
                self.orphan(previous);
                return Err(IngestionError::UnsubscribeFailed { topic, source });
            }
            info!(topic = %previous.topic, "subscription closed");
        }
        self.release_orphans()
    }

    fn orphan(&self, subscription: ActiveSubscription) {
        self.orphaned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
    }

    /// Retry unsubscribing orphans; the first failure is returned
    fn release_orphans(&self) -> Result<()> {
        let mut orphaned = self.orphaned.lock().unwrap_or_else(PoisonError::into_inner);
        let mut first_error = None;

        orphaned.retain(|orphan| match self.broker.unsubscribe(orphan.token) {
            Ok(()) => {
                debug!(topic = %orphan.topic, "orphaned subscription released");
                false
            }
            Err(source) => {
                first_error.get_or_insert(IngestionError::UnsubscribeFailed {
                    topic: orphan.topic.to_string(),
                    source,
                });
                true
            }
        });

        first_error.map_or(Ok(()), Err)
    }

    /// Subscriptions the broker has not yet agreed to drop
    pub fn orphaned_count(&self) -> usize {
        self.orphaned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn callback(&self, generation: u64) -> MessageCallback {
        let fence = Arc::clone(&self.fence);
        let queue = Arc::clone(&self.queue);

        Arc::new(move |message: RawMessage| {
            let _shared = fence.gate.read().unwrap_or_else(PoisonError::into_inner);
            if fence.current() != generation {
                trace!(topic = %message.topic, generation, "stale subscription, message ignored");
                return;
            }
            queue.push(message);
        })
    }

    /// Topic of the active subscription
    pub fn active_topic(&self) -> Option<Topic> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.topic.clone())
    }

    pub fn is_subscribed(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current fence generation
    pub fn generation(&self) -> u64 {
        self.fence.current()
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn broker(&self) -> &Arc<dyn MessageBroker> {
        &self.broker
    }
}

impl Drop for TopicSubscriptionManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close subscription on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use contracts::DropPolicy;

    fn setup() -> (Arc<InMemoryBroker>, TopicSubscriptionManager) {
        let broker = Arc::new(InMemoryBroker::new("localhost:1883"));
        let queue = Arc::new(MessageQueue::new(64, DropPolicy::DropOldest));
        let manager = TopicSubscriptionManager::new(broker.clone(), queue);
        (broker, manager)
    }

    fn queued_payloads(manager: &TopicSubscriptionManager) -> Vec<String> {
        let rx = manager.queue().receiver();
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(String::from_utf8(m.payload.to_vec()).unwrap());
        }
        out
    }

    #[test]
    fn test_retopic_routes_messages() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();

        broker.publish("sensors/a", "1");
        broker.publish("sensors/b", "ignored");

        assert_eq!(queued_payloads(&manager), vec!["1"]);
        assert_eq!(manager.active_topic().unwrap(), "sensors/a");
    }

    #[test]
    fn test_retopic_same_topic_is_idempotent() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();
        let generation = manager.generation();
        manager.retopic("sensors/a").unwrap();

        assert_eq!(broker.subscription_count(), 1);
        assert_eq!(manager.generation(), generation);

        broker.publish("sensors/a", "once");
        assert_eq!(queued_payloads(&manager), vec!["once"]);
    }

    #[test]
    fn test_retopic_switches_topic() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();
        manager.retopic("sensors/b").unwrap();

        assert_eq!(broker.subscription_count(), 1);
        broker.publish("sensors/a", "old");
        broker.publish("sensors/b", "new");
        assert_eq!(queued_payloads(&manager), vec!["new"]);
    }

    #[test]
    fn test_stale_callback_is_muted() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();
        let stale = manager.callback(manager.generation());
        manager.retopic("sensors/b").unwrap();

        // A broker that still fires the old callback after unsubscribe
        stale(RawMessage::new("sensors/a", "late"));
        broker.publish("sensors/b", "fresh");

        assert_eq!(queued_payloads(&manager), vec!["fresh"]);
    }

    #[test]
    fn test_subscribe_failure_is_fail_closed() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();

        broker.set_subscribe_failure(true);
        let err = manager.retopic("sensors/b").unwrap_err();
        assert!(matches!(err, IngestionError::SubscribeFailed { .. }));
        assert!(!manager.is_subscribed());
        assert_eq!(broker.subscription_count(), 0);

        broker.publish("sensors/a", "stale");
        assert!(queued_payloads(&manager).is_empty());

        broker.set_subscribe_failure(false);
        manager.retopic("sensors/b").unwrap();
        assert!(manager.is_subscribed());
    }

    #[test]
    fn test_unsubscribe_failure_is_fail_closed() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();

        broker.set_unsubscribe_failure(true);
        let err = manager.retopic("sensors/b").unwrap_err();
        assert!(matches!(
            &err,
            IngestionError::UnsubscribeFailed { topic, .. } if topic == "sensors/a"
        ));
        assert!(!manager.is_subscribed());
        assert_eq!(manager.orphaned_count(), 1);

        // The broker still delivers to the old callback, which is muted
        assert_eq!(broker.publish("sensors/a", "stale"), 1);
        broker.publish("sensors/b", "not subscribed");
        assert!(queued_payloads(&manager).is_empty());

        broker.set_unsubscribe_failure(false);
        manager.retopic("sensors/b").unwrap();
        assert_eq!(manager.orphaned_count(), 0);
        assert_eq!(broker.subscribed_topics(), vec![Topic::new("sensors/b")]);

        broker.publish("sensors/a", "old");
        broker.publish("sensors/b", "new");
        assert_eq!(queued_payloads(&manager), vec!["new"]);
    }

    #[test]
    fn test_close_retries_orphaned_subscription() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();

        broker.set_unsubscribe_failure(true);
        assert!(manager.close().is_err());
        assert!(!manager.is_subscribed());
        assert_eq!(broker.subscription_count(), 1);

        broker.set_unsubscribe_failure(false);
        manager.close().unwrap();
        assert_eq!(manager.orphaned_count(), 0);
        assert_eq!(broker.subscription_count(), 0);
    }

    #[test]
    fn test_close_unsubscribes() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();
        manager.close().unwrap();

        assert!(!manager.is_subscribed());
        assert_eq!(broker.subscription_count(), 0);
        manager.close().unwrap();
    }

    #[test]
    fn test_empty_topic_rejected() {
        let (_broker, manager) = setup();
        assert!(matches!(
            manager.retopic(""),
            Err(IngestionError::EmptyTopic)
        ));
    }

    #[test]
    fn test_drop_releases_subscription() {
        let (broker, manager) = setup();
        manager.retopic("sensors/a").unwrap();
        drop(manager);
        assert_eq!(broker.subscription_count(), 0);
    }
}
