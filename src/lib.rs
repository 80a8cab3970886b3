//! # Control Pub/Sub
//!
//! Messaging layer for cluster control-plane events: actor and job
//! lifecycle, node membership, worker failures, error and log streams.
//!
//! ## Components
//!
//! - **Envelope**: channel type, entity key, sequence id and one typed payload
//! - **Publisher**: maps domain events onto envelopes, fire-and-forget
//! - **ChannelSubscriber**: whole-channel and per-key callback dispatch over
//!   a shared [`Transport`]
//! - **LongPollSubscriber**: pull-style client speaking the long-poll
//!   protocol directly, with sequence ordering and failover detection
//!
//! ## Example
//!
//! ```ignore
//! use control_pubsub::{ChannelSubscriber, InMemoryTransport, Publisher, SubscriberConfig};
//!
//! let transport = Arc::new(InMemoryTransport::new(endpoint.clone()));
//! let publisher = Publisher::new(Arc::clone(&transport));
//! let subscriber = ChannelSubscriber::new(transport, SubscriberConfig::new(endpoint));
//!
//! subscriber.subscribe_actor(actor_id, |id, actor| println!("{}: {:?}", id, actor.state), None)?;
//! publisher.publish_actor(&actor_id, record, None)?;
//! ```

pub mod channel;
pub mod envelope;
pub mod error;
pub mod long_poll;
pub mod publisher;
pub mod subscriber;
pub mod transport;
pub mod types;

// Re-exports
pub use channel::{
    ActorChannel, ChannelKind, EntityKey, ErrorInfoChannel, JobChannel, LogChannel,
    NodeInfoChannel, WorkerDeltaChannel,
};
pub use envelope::{Envelope, Payload};
pub use error::{PubSubError, Result};
pub use long_poll::{
    CallContext, Connector, LongPollConfig, LongPollSubscriber, PollReply, PollRequest,
    PubSubRpc, RegisterRequest, RpcResult, RpcStatus, SessionStats, StatusCode,
    UnregisterRequest,
};
pub use publisher::Publisher;
pub use subscriber::{
    Callbacks, ChannelSubscriber, ItemCallback, SubscriberConfig, SubscriptionKey,
    ViolationPolicy,
};
pub use transport::{
    DeliveryHandlers, FailureHandler, InMemoryTransport, ItemHandler, RegistryStats,
    StatusCallback, Transport,
};
pub use types::*;
