//! MessageBroker trait - inbound transport abstraction
//!
//! Connection management, authentication and reconnection live behind this
//! trait. The streaming core only subscribes, unsubscribes and observes
//! connectivity.

use std::sync::Arc;

use crate::{ContractError, RawMessage};

/// Per-message delivery callback
///
/// Invoked on the broker's own delivery thread/task. Implementations of the
/// callback must not block.
pub type MessageCallback = Arc<dyn Fn(RawMessage) + Send + Sync>;

/// Opaque handle for one active topic subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

/// Inbound message source
pub trait MessageBroker: Send + Sync {
    /// Broker address (for logging / diagnostics)
    fn endpoint(&self) -> &str;

    /// Subscribe to a topic (or topic filter)
    ///
    /// Every message received on a matching topic is passed to `callback`
    /// until the returned token is unsubscribed.
    fn subscribe(
        &self,
        topic: &str,
        callback: MessageCallback,
    ) -> Result<SubscriptionToken, ContractError>;

    /// Cancel a subscription. Unknown tokens are not an error.
    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), ContractError>;

    /// Whether the transport is currently connected
    fn is_connected(&self) -> bool;
}
