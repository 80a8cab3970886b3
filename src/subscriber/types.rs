//! Subscription types for callback dispatch.

use crate::channel::ChannelKind;
use crate::error::{PubSubError, Result};
use crate::transport::{FailureHandler, StatusCallback};
use crate::types::{ChannelType, Endpoint, KeyId};
use std::sync::Arc;

/// What to do when a delivery breaks the subscription's contract
/// (wrong channel, wrong key, undecodable key or payload).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Log and panic. Continuing would read a stream under a wrong assumption.
    #[default]
    Abort,
    /// Log and hand `ProtocolViolation` back to the transport.
    Propagate,
}

/// Configuration for a channel subscriber.
#[derive(Clone, Debug, Default)]
pub struct SubscriberConfig {
    /// Publisher all subscriptions are registered against.
    pub endpoint: Endpoint,

    /// Handling of contract violations on delivery.
    /// Default: Abort
    pub violation_policy: ViolationPolicy,
}

impl SubscriberConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }
}

/// Identity of one subscription record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel_type: ChannelType,
    /// None for whole-channel subscriptions.
    pub key: Option<KeyId>,
    pub endpoint: Endpoint,
}

impl SubscriptionKey {
    /// Key for a whole-channel subscription.
    pub fn channel(channel_type: ChannelType, endpoint: Endpoint) -> Self {
        Self {
            channel_type,
            key: None,
            endpoint,
        }
    }

    /// Key for a single-entity subscription.
    pub fn entity(channel_type: ChannelType, key: KeyId, endpoint: Endpoint) -> Self {
        Self {
            channel_type,
            key: Some(key),
            endpoint,
        }
    }
}

/// Typed item callback for channel `C`.
pub type ItemCallback<C> =
    Arc<dyn Fn(<C as ChannelKind>::Id, <C as ChannelKind>::Record) + Send + Sync>;

/// Caller callbacks for one subscription.
pub struct Callbacks<C: ChannelKind> {
    /// Invoked with `(id, record)` for every matching delivery.
    pub item: ItemCallback<C>,
    /// Invoked once the transport has established (or refused) the subscription.
    pub done: Option<StatusCallback>,
    /// Invoked after the subscription layer has logged an establishment failure.
    pub failure: Option<FailureHandler>,
}

impl<C: ChannelKind> Callbacks<C> {
    pub fn new<F>(item: F) -> Self
    where
        F: Fn(C::Id, C::Record) + Send + Sync + 'static,
    {
        Self {
            item: Arc::new(item),
            done: None,
            failure: None,
        }
    }

    pub fn on_done<F>(mut self, done: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.done = Some(Box::new(done));
        self
    }

    pub fn on_failure<F>(mut self, failure: F) -> Self
    where
        F: Fn(&KeyId, &PubSubError) + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(failure));
        self
    }
}
