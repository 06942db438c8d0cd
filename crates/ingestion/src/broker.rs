//! In-memory broker
//!
//! `MessageBroker` implementation without a network transport. Used by the
//! CLI replay mode and by tests. Honours MQTT topic filters (`+`, `#`) and
//! offers switches for connection loss and subscribe/unsubscribe failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use contracts::{
    ContractError, DatasourceSettings, MessageBroker, MessageCallback, RawMessage,
    SubscriptionToken, Topic,
};
use tracing::{debug, info, trace};

struct Subscriber {
    filter: Topic,
    callback: MessageCallback,
}

/// Process-local broker
pub struct InMemoryBroker {
    endpoint: String,
    connected: AtomicBool,
    next_token: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Subscriber>>,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    published: AtomicU64,
}

impl InMemoryBroker {
    /// Connected broker
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connected: AtomicBool::new(true),
            next_token: AtomicU64::new(1),
            subscribers: Mutex::new(BTreeMap::new()),
            fail_subscribe: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// Broker bound to the configured datasource address
    ///
    /// # Errors
    /// `BrokerConnection` if the endpoint is empty.
    pub fn connect(settings: &DatasourceSettings) -> Result<Self, ContractError> {
        let url = settings.broker_url();
        if settings.endpoint.trim().is_empty() {
            return Err(ContractError::broker_connection(url, "endpoint is empty"));
        }
        info!(
            url = %url,
            authenticated = settings.has_credentials(),
            "in-memory broker connected"
        );
        Ok(Self::new(url))
    }

    /// Deliver a message to every matching subscriber
    ///
    /// Returns the number of deliveries. A disconnected broker delivers
    /// nothing.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        if !self.is_connected() {
            trace!(topic, "broker disconnected, publish discarded");
            return 0;
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let payload = payload.into();
        // Callbacks run outside the lock so they may re-enter the broker
        let callbacks: Vec<MessageCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.filter.matches(topic))
            .map(|s| s.callback.clone())
            .collect();

        for callback in &callbacks {
            callback(RawMessage::new(topic, payload.clone()));
        }
        trace!(topic, deliveries = callbacks.len(), "published");
        callbacks.len()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, connected, "connection state changed");
    }

    /// Make subsequent `subscribe` calls fail
    pub fn set_subscribe_failure(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `unsubscribe` calls fail
    pub fn set_unsubscribe_failure(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Filters of all live subscriptions, in subscription order
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.filter.clone())
            .collect()
    }

    /// Messages accepted by `publish` so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl MessageBroker for InMemoryBroker {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn subscribe(
        &self,
        topic: &str,
        callback: MessageCallback,
    ) -> Result<SubscriptionToken, ContractError> {
        if !self.is_connected() {
            return Err(ContractError::broker_connection(
                &self.endpoint,
                "not connected",
            ));
        }
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ContractError::subscription(topic, "subscribe rejected"));
        }

        let id = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    filter: Topic::new(topic),
                    callback,
                },
            );
        debug!(topic, token = id, "subscribed");
        Ok(SubscriptionToken(id))
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), ContractError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // A rejected unsubscribe leaves the subscription live
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            let topic = subscribers
                .get(&token.0)
                .map(|s| s.filter.to_string())
                .unwrap_or_default();
            return Err(ContractError::subscription(topic, "unsubscribe rejected"));
        }
        if let Some(subscriber) = subscribers.remove(&token.0) {
            debug!(topic = %subscriber.filter, token = token.0, "unsubscribed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
