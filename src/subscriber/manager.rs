//! Channel subscriber: callback dispatch over a shared transport.

use crate::channel::{
    ActorChannel, ChannelKind, EntityKey, JobChannel, NodeInfoChannel, WorkerDeltaChannel,
};
use crate::envelope::Envelope;
use crate::error::{PubSubError, Result};
use crate::transport::{DeliveryHandlers, FailureHandler, ItemHandler, StatusCallback, Transport};
use crate::types::{
    ActorId, ActorRecord, JobId, JobRecord, KeyId, NodeInfoRecord, WorkerDeltaRecord,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

use super::types::{Callbacks, SubscriberConfig, SubscriptionKey, ViolationPolicy};

/// Internal subscription state.
struct SubscriptionRecord {
    /// Unwraps the payload and calls the caller's item callback.
    on_item: ItemHandler,
    on_failure: Option<FailureHandler>,
}

/// Subscription records shared with the transport's handlers.
///
/// Handlers hold a `Weak` to this table, so dropping the subscriber stops
/// dispatch even if the transport keeps the registration around.
struct SubscriptionTable {
    records: RwLock<HashMap<SubscriptionKey, SubscriptionRecord>>,
    policy: ViolationPolicy,
}

impl SubscriptionTable {
    fn dispatch(&self, key: &SubscriptionKey, envelope: Envelope) -> Result<()> {
        if envelope.channel_type != key.channel_type {
            return self.violation(format!(
                "{} subscription at {} received a {} envelope",
                key.channel_type, key.endpoint, envelope.channel_type
            ));
        }

        if let Some(expected) = &key.key {
            if envelope.key_id != *expected {
                return self.violation(format!(
                    "{} subscription for key {} received key {}",
                    key.channel_type, expected, envelope.key_id
                ));
            }
        }

        let handler = self.records.read().get(key).map(|r| Arc::clone(&r.on_item));
        let Some(handler) = handler else {
            debug!(
                channel_type = %key.channel_type,
                endpoint = %key.endpoint,
                "dropping delivery for released subscription"
            );
            return Ok(());
        };

        trace!(
            channel_type = %envelope.channel_type,
            key = %envelope.key_id,
            sequence_id = %envelope.sequence_id,
            "dispatching"
        );

        handler(envelope).or_else(|e| self.escalate(e))
    }

    fn on_failure(&self, key: &SubscriptionKey, failed_key: &KeyId, error: &PubSubError) {
        if let Some(expected) = &key.key {
            if failed_key != expected {
                // Under Propagate the violation is logged and the callback skipped.
                let _ = self.violation(format!(
                    "{} subscription for key {} reported failure for key {}",
                    key.channel_type, expected, failed_key
                ));
                return;
            }
        }

        match &key.key {
            Some(k) => warn!(
                channel_type = %key.channel_type,
                key = %k,
                endpoint = %key.endpoint,
                error = %error,
                "subscription failed"
            ),
            None => warn!(
                channel_type = %key.channel_type,
                endpoint = %key.endpoint,
                error = %error,
                "channel subscription failed"
            ),
        }

        // The transport has dropped the registration; drop the record with it.
        let record = self.records.write().remove(key);
        if let Some(callback) = record.and_then(|r| r.on_failure) {
            callback(failed_key, error);
        }
    }

    fn violation(&self, message: String) -> Result<()> {
        self.escalate(PubSubError::ProtocolViolation(message))
    }

    fn escalate(&self, error: PubSubError) -> Result<()> {
        error!(error = %error, "subscription contract violated");
        match self.policy {
            ViolationPolicy::Abort => panic!("{}", error),
            ViolationPolicy::Propagate => Err(error),
        }
    }
}

/// Registers whole-channel and per-key interest with a transport and
/// dispatches deliveries to caller callbacks.
///
/// Callbacks run on whatever thread the transport delivers on; concurrent
/// deliveries across subscriptions are possible.
pub struct ChannelSubscriber<T: Transport> {
    transport: Arc<T>,
    config: SubscriberConfig,
    table: Arc<SubscriptionTable>,
}

impl<T: Transport> ChannelSubscriber<T> {
    pub fn new(transport: Arc<T>, config: SubscriberConfig) -> Self {
        let table = Arc::new(SubscriptionTable {
            records: RwLock::new(HashMap::new()),
            policy: config.violation_policy,
        });

        Self {
            transport,
            config,
            table,
        }
    }

    /// Number of live subscription records.
    pub fn subscription_count(&self) -> usize {
        self.table.records.read().len()
    }

    /// Subscribe to every envelope of channel `C`.
    ///
    /// The item callback gets the id decoded from each envelope's key.
    /// Re-subscribing replaces the existing record. Establishment failures
    /// arrive through the failure callback, never through this return value.
    pub fn subscribe_channel<C: ChannelKind>(&self, callbacks: Callbacks<C>) -> Result<()> {
        let Callbacks {
            item,
            done,
            failure,
        } = callbacks;

        let on_item: ItemHandler = Arc::new(move |envelope: Envelope| -> Result<()> {
            let id = C::Id::from_key(&envelope.key_id)?;
            let record = envelope.into_record::<C>()?;
            item(id, record);
            Ok(())
        });

        let key = SubscriptionKey::channel(C::CHANNEL, self.config.endpoint.clone());
        self.register(key, on_item, failure, done);
        Ok(())
    }

    /// Subscribe to envelopes of channel `C` for one entity.
    ///
    /// The item callback gets `id` back as supplied.
    pub fn subscribe<C: ChannelKind>(&self, id: C::Id, callbacks: Callbacks<C>) -> Result<()> {
        let Callbacks {
            item,
            done,
            failure,
        } = callbacks;

        let key_id = id.to_key();
        let on_item: ItemHandler = Arc::new(move |envelope: Envelope| -> Result<()> {
            let record = envelope.into_record::<C>()?;
            item(id.clone(), record);
            Ok(())
        });

        let key = SubscriptionKey::entity(C::CHANNEL, key_id, self.config.endpoint.clone());
        self.register(key, on_item, failure, done);
        Ok(())
    }

    /// Release a per-entity subscription.
    pub fn unsubscribe<C: ChannelKind>(&self, id: &C::Id) -> Result<()> {
        let key = SubscriptionKey::entity(C::CHANNEL, id.to_key(), self.config.endpoint.clone());
        self.table.records.write().remove(&key);
        if let Some(key_id) = &key.key {
            self.transport.unsubscribe(C::CHANNEL, &self.config.endpoint, key_id);
        }
        Ok(())
    }

    /// Release a whole-channel subscription.
    pub fn unsubscribe_channel<C: ChannelKind>(&self) -> Result<()> {
        let key = SubscriptionKey::channel(C::CHANNEL, self.config.endpoint.clone());
        self.table.records.write().remove(&key);
        self.transport.unsubscribe_channel(C::CHANNEL, &self.config.endpoint);
        Ok(())
    }

    /// True iff the transport holds no subscription for this entity.
    pub fn is_unsubscribed<C: ChannelKind>(&self, id: &C::Id) -> bool {
        !self
            .transport
            .is_subscribed(C::CHANNEL, &self.config.endpoint, &id.to_key())
    }

    fn register(
        &self,
        key: SubscriptionKey,
        on_item: ItemHandler,
        on_failure: Option<FailureHandler>,
        on_done: Option<StatusCallback>,
    ) {
        let refreshed = self
            .table
            .records
            .write()
            .insert(key.clone(), SubscriptionRecord { on_item, on_failure })
            .is_some();

        if refreshed {
            debug!(
                channel_type = %key.channel_type,
                endpoint = %key.endpoint,
                "refreshing existing subscription"
            );
        }

        let handlers = self.handlers_for(&key, on_done);

        // Resubscription is intentional, so the transport's verdict on
        // whether this replaced a registration doesn't matter here.
        match &key.key {
            None => {
                self.transport.subscribe_channel(key.channel_type, &key.endpoint, handlers);
            }
            Some(key_id) => {
                self.transport.subscribe(key.channel_type, &key.endpoint, key_id, handlers);
            }
        }
    }

    fn handlers_for(
        &self,
        key: &SubscriptionKey,
        on_done: Option<StatusCallback>,
    ) -> DeliveryHandlers {
        let table: Weak<SubscriptionTable> = Arc::downgrade(&self.table);
        let item_key = key.clone();
        let on_item: ItemHandler = Arc::new(move |envelope: Envelope| -> Result<()> {
            match table.upgrade() {
                Some(table) => table.dispatch(&item_key, envelope),
                None => Ok(()),
            }
        });

        let table: Weak<SubscriptionTable> = Arc::downgrade(&self.table);
        let failure_key = key.clone();
        let on_failure: FailureHandler =
            Arc::new(move |failed_key: &KeyId, error: &PubSubError| {
                if let Some(table) = table.upgrade() {
                    table.on_failure(&failure_key, failed_key, error);
                }
            });

        DeliveryHandlers {
            on_item,
            on_failure,
            on_done,
        }
    }

    // --- Per-kind wrappers ---

    /// Subscribe to all job updates.
    pub fn subscribe_all_jobs<F>(&self, on_item: F, done: Option<StatusCallback>) -> Result<()>
    where
        F: Fn(JobId, JobRecord) + Send + Sync + 'static,
    {
        let mut callbacks = Callbacks::<JobChannel>::new(on_item);
        callbacks.done = done;
        self.subscribe_channel(callbacks)
    }

    /// Subscribe to updates for one actor.
    pub fn subscribe_actor<F>(
        &self,
        id: ActorId,
        on_item: F,
        done: Option<StatusCallback>,
    ) -> Result<()>
    where
        F: Fn(ActorId, ActorRecord) + Send + Sync + 'static,
    {
        let mut callbacks = Callbacks::<ActorChannel>::new(on_item);
        callbacks.done = done;
        self.subscribe(id, callbacks)
    }

    pub fn unsubscribe_actor(&self, id: &ActorId) -> Result<()> {
        self.unsubscribe::<ActorChannel>(id)
    }

    pub fn is_actor_unsubscribed(&self, id: &ActorId) -> bool {
        self.is_unsubscribed::<ActorChannel>(id)
    }

    /// Subscribe to all node membership changes.
    pub fn subscribe_all_node_info<F>(&self, on_item: F, done: Option<StatusCallback>) -> Result<()>
    where
        F: Fn(NodeInfoRecord) + Send + Sync + 'static,
    {
        let mut callbacks = Callbacks::<NodeInfoChannel>::new(move |_, record| on_item(record));
        callbacks.done = done;
        self.subscribe_channel(callbacks)
    }

    /// Subscribe to all worker failures.
    pub fn subscribe_all_worker_failures<F>(
        &self,
        on_item: F,
        done: Option<StatusCallback>,
    ) -> Result<()>
    where
        F: Fn(WorkerDeltaRecord) + Send + Sync + 'static,
    {
        let mut callbacks = Callbacks::<WorkerDeltaChannel>::new(move |_, record| on_item(record));
        callbacks.done = done;
        self.subscribe_channel(callbacks)
    }
}
