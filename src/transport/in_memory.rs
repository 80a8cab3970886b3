//! Loopback transport serving one publisher endpoint in-process.

use super::{DeliveryHandlers, FailureHandler, ItemHandler, Transport};
use crate::envelope::Envelope;
use crate::error::{PubSubError, Result};
use crate::types::{ChannelType, Endpoint, KeyId, SequenceId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RegistrationKey {
    channel_type: ChannelType,
    endpoint: Endpoint,
    /// None for whole-channel registrations.
    key: Option<KeyId>,
}

struct Registration {
    on_item: ItemHandler,
    on_failure: FailureHandler,
}

/// Snapshot of the registry, rendered by `debug_string`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RegistryStats {
    pub endpoint: String,
    pub channel_subscriptions: usize,
    pub key_subscriptions: usize,
    pub by_channel: BTreeMap<String, usize>,
    pub published: u64,
    pub delivery_errors: u64,
}

/// In-process transport.
///
/// Registrations for any endpoint other than the one it serves are refused
/// as unreachable. Delivery is synchronous on the publishing thread.
pub struct InMemoryTransport {
    endpoint: Endpoint,
    registrations: RwLock<HashMap<RegistrationKey, Registration>>,
    next_sequence: AtomicU64,
    published: AtomicU64,
    delivery_errors: AtomicU64,
}

impl InMemoryTransport {
    /// Create a transport serving `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            registrations: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivery_errors: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let regs = self.registrations.read();

        let mut stats = RegistryStats {
            endpoint: self.endpoint.to_string(),
            published: self.published.load(Ordering::SeqCst),
            delivery_errors: self.delivery_errors.load(Ordering::SeqCst),
            ..Default::default()
        };

        for key in regs.keys() {
            if key.key.is_some() {
                stats.key_subscriptions += 1;
            } else {
                stats.channel_subscriptions += 1;
            }
            *stats
                .by_channel
                .entry(key.channel_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        stats
    }

    /// Drop a registration as if the connection behind it was lost, and
    /// report the failure to its owner. Returns whether one existed.
    pub fn fail_subscription(
        &self,
        channel_type: ChannelType,
        key: Option<&KeyId>,
        error: PubSubError,
    ) -> bool {
        let reg_key = RegistrationKey {
            channel_type,
            endpoint: self.endpoint.clone(),
            key: key.cloned(),
        };

        let removed = self.registrations.write().remove(&reg_key);
        match removed {
            Some(reg) => {
                let empty = KeyId::default();
                (reg.on_failure)(key.unwrap_or(&empty), &error);
                true
            }
            None => false,
        }
    }

    /// Hand an envelope straight to one registration, bypassing routing.
    ///
    /// Returns the handler's verdict; `Ok` if nothing is registered.
    pub fn deliver_raw(
        &self,
        channel_type: ChannelType,
        key: Option<&KeyId>,
        envelope: Envelope,
    ) -> Result<()> {
        let reg_key = RegistrationKey {
            channel_type,
            endpoint: self.endpoint.clone(),
            key: key.cloned(),
        };

        let handler = self
            .registrations
            .read()
            .get(&reg_key)
            .map(|reg| Arc::clone(&reg.on_item));

        match handler {
            Some(handler) => handler(envelope),
            None => Ok(()),
        }
    }

    fn register(
        &self,
        channel_type: ChannelType,
        endpoint: &Endpoint,
        key: Option<&KeyId>,
        handlers: DeliveryHandlers,
    ) -> bool {
        let DeliveryHandlers {
            on_item,
            on_failure,
            on_done,
        } = handlers;

        if *endpoint != self.endpoint {
            debug!(%channel_type, %endpoint, "refusing registration for foreign endpoint");
            if let Some(done) = on_done {
                done(Err(PubSubError::Unreachable(endpoint.clone())));
            }
            let empty = KeyId::default();
            on_failure(
                key.unwrap_or(&empty),
                &PubSubError::Unreachable(endpoint.clone()),
            );
            return false;
        }

        let reg_key = RegistrationKey {
            channel_type,
            endpoint: endpoint.clone(),
            key: key.cloned(),
        };

        let replaced = self
            .registrations
            .write()
            .insert(reg_key, Registration { on_item, on_failure })
            .is_some();

        if let Some(done) = on_done {
            done(Ok(()));
        }

        !replaced
    }

    fn unregister(
        &self,
        channel_type: ChannelType,
        endpoint: &Endpoint,
        key: Option<&KeyId>,
    ) -> bool {
        let reg_key = RegistrationKey {
            channel_type,
            endpoint: endpoint.clone(),
            key: key.cloned(),
        };
        self.registrations.write().remove(&reg_key).is_some()
    }
}

impl Transport for InMemoryTransport {
    fn publish(&self, mut envelope: Envelope) {
        envelope.sequence_id = SequenceId(self.next_sequence.fetch_add(1, Ordering::SeqCst));
        self.published.fetch_add(1, Ordering::SeqCst);

        // Handlers run outside the registry lock so they may (un)subscribe.
        let targets: Vec<ItemHandler> = {
            let regs = self.registrations.read();
            let channel_key = RegistrationKey {
                channel_type: envelope.channel_type,
                endpoint: self.endpoint.clone(),
                key: None,
            };
            let entity_key = RegistrationKey {
                key: Some(envelope.key_id.clone()),
                ..channel_key.clone()
            };

            [channel_key, entity_key]
                .iter()
                .filter_map(|k| regs.get(k))
                .map(|reg| Arc::clone(&reg.on_item))
                .collect()
        };

        trace!(
            channel_type = %envelope.channel_type,
            key = %envelope.key_id,
            sequence_id = %envelope.sequence_id,
            targets = targets.len(),
            "publishing"
        );

        for handler in targets {
            if let Err(e) = handler(envelope.clone()) {
                self.delivery_errors.fetch_add(1, Ordering::SeqCst);
                error!(
                    channel_type = %envelope.channel_type,
                    key = %envelope.key_id,
                    error = %e,
                    "delivery rejected by subscriber"
                );
            }
        }
    }

    fn subscribe_channel(
        &self,
        channel_type: ChannelType,
        endpoint: &Endpoint,
        handlers: DeliveryHandlers,
    ) -> bool {
        self.register(channel_type, endpoint, None, handlers)
    }

    fn subscribe(
        &self,
        channel_type: ChannelType,
        endpoint: &Endpoint,
        key: &KeyId,
        handlers: DeliveryHandlers,
    ) -> bool {
        self.register(channel_type, endpoint, Some(key), handlers)
    }

    fn unsubscribe(&self, channel_type: ChannelType, endpoint: &Endpoint, key: &KeyId) -> bool {
        self.unregister(channel_type, endpoint, Some(key))
    }

    fn unsubscribe_channel(&self, channel_type: ChannelType, endpoint: &Endpoint) -> bool {
        self.unregister(channel_type, endpoint, None)
    }

    fn is_subscribed(&self, channel_type: ChannelType, endpoint: &Endpoint, key: &KeyId) -> bool {
        let reg_key = RegistrationKey {
            channel_type,
            endpoint: endpoint.clone(),
            key: Some(key.clone()),
        };
        self.registrations.read().contains_key(&reg_key)
    }

    fn debug_string(&self) -> String {
        match serde_json::to_string_pretty(&self.stats()) {
            Ok(s) => s,
            Err(e) => format!("InMemoryTransport({}): {}", self.endpoint, e),
        }
    }
}
