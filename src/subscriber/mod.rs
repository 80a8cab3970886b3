//! Callback-dispatch subscriptions over a shared transport.
//!
//! Two modes:
//! - Whole-channel: every envelope of one channel from the publisher
//! - Per-key: envelopes for exactly one entity within a channel
//!
//! Each subscription is a record in a table keyed by
//! `(channel_type, key, endpoint)`. Subscribing again for the same key
//! refreshes the record. Deliveries are checked against the record's
//! channel and key before the payload is unwrapped.
//!
//! # Example
//!
//! ```ignore
//! let subscriber = ChannelSubscriber::new(transport, SubscriberConfig::new(endpoint));
//!
//! subscriber.subscribe_actor(actor_id, |id, record| {
//!     println!("actor {} is now {:?}", id, record.state);
//! }, None)?;
//!
//! subscriber.subscribe_channel(
//!     Callbacks::<JobChannel>::new(|id, job| println!("job {}: {:?}", id, job))
//!         .on_failure(|_, err| eprintln!("lost job feed: {}", err)),
//! )?;
//! ```

mod manager;
mod types;

pub use manager::ChannelSubscriber;
pub use types::{Callbacks, ItemCallback, SubscriberConfig, SubscriptionKey, ViolationPolicy};
