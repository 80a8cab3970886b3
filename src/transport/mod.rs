//! Transport seam.
//!
//! The engine that performs network delivery and keeps the subscriber
//! registry lives behind [`Transport`]. The publisher and channel subscriber
//! only ever talk to this trait.
//!
//! [`InMemoryTransport`] is a loopback implementation serving one publisher
//! endpoint inside the process.

mod in_memory;

pub use in_memory::{InMemoryTransport, RegistryStats};

use crate::envelope::Envelope;
use crate::error::{PubSubError, Result};
use crate::types::{ChannelType, Endpoint, KeyId};
use std::sync::Arc;

/// Handles one delivered envelope. An `Err` means the delivery broke the
/// subscription's contract.
pub type ItemHandler = Arc<dyn Fn(Envelope) -> Result<()> + Send + Sync>;

/// Told which key failed and why when a subscription is lost or refused.
pub type FailureHandler = Arc<dyn Fn(&KeyId, &PubSubError) + Send + Sync>;

/// One-shot completion callback.
pub type StatusCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Callbacks handed to the transport for one registration.
pub struct DeliveryHandlers {
    pub on_item: ItemHandler,
    pub on_failure: FailureHandler,
    /// Invoked once the registration has been established (or refused).
    pub on_done: Option<StatusCallback>,
}

/// Generic pub/sub transport.
pub trait Transport: Send + Sync {
    /// Hand an envelope to the transport for delivery. Fire-and-forget.
    fn publish(&self, envelope: Envelope);

    /// Register interest in every envelope of a channel from `endpoint`.
    ///
    /// Returns false when an existing registration was replaced (or refused).
    fn subscribe_channel(
        &self,
        channel_type: ChannelType,
        endpoint: &Endpoint,
        handlers: DeliveryHandlers,
    ) -> bool;

    /// Register interest in one key of a channel from `endpoint`.
    ///
    /// Returns false when an existing registration was replaced (or refused).
    fn subscribe(
        &self,
        channel_type: ChannelType,
        endpoint: &Endpoint,
        key: &KeyId,
        handlers: DeliveryHandlers,
    ) -> bool;

    /// Release a key registration. Returns whether one existed.
    fn unsubscribe(&self, channel_type: ChannelType, endpoint: &Endpoint, key: &KeyId) -> bool;

    /// Release a whole-channel registration. Returns whether one existed.
    fn unsubscribe_channel(&self, channel_type: ChannelType, endpoint: &Endpoint) -> bool;

    fn is_subscribed(&self, channel_type: ChannelType, endpoint: &Endpoint, key: &KeyId) -> bool;

    /// Human-readable summary of the registry, for diagnostics.
    fn debug_string(&self) -> String;
}
