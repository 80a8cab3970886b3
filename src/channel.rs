//! Per-channel type table.
//!
//! Each channel kind names its entity id type, its record type and how that
//! record sits inside a [`Payload`]. Publisher, subscriber and the typed poll
//! wrappers are written once against [`ChannelKind`].

use crate::envelope::Payload;
use crate::error::{PubSubError, Result};
use crate::types::{
    ActorId, ActorRecord, ChannelType, ErrorRecord, JobId, JobRecord, KeyId, LogBatch,
    NodeId, NodeInfoRecord, WorkerDeltaRecord, WorkerId,
};

/// An entity id with a canonical binary key encoding.
pub trait EntityKey: Clone + Send + Sync + 'static {
    fn to_key(&self) -> KeyId;
    fn from_key(key: &KeyId) -> Result<Self>;
}

macro_rules! binary_entity_key {
    ($($id:ty),*) => {
        $(
            impl EntityKey for $id {
                fn to_key(&self) -> KeyId {
                    KeyId(self.binary())
                }

                fn from_key(key: &KeyId) -> Result<Self> {
                    <$id>::from_binary(key.as_bytes())
                }
            }
        )*
    };
}

binary_entity_key!(JobId, ActorId, NodeId, WorkerId);

impl EntityKey for String {
    fn to_key(&self) -> KeyId {
        KeyId(self.as_bytes().to_vec())
    }

    fn from_key(key: &KeyId) -> Result<Self> {
        String::from_utf8(key.0.clone()).map_err(|e| PubSubError::InvalidKey(e.to_string()))
    }
}

/// A channel and the typed record it carries.
pub trait ChannelKind: Send + Sync + 'static {
    const CHANNEL: ChannelType;

    type Id: EntityKey;
    type Record: Clone + Send + 'static;

    fn wrap(record: Self::Record) -> Payload;

    /// `None` when the payload belongs to a different channel.
    fn unwrap(payload: Payload) -> Option<Self::Record>;
}

macro_rules! channel_kind {
    ($(#[$meta:meta])* $marker:ident, $channel:expr, $id:ty, $record:ty, $variant:ident) => {
        $(#[$meta])*
        pub enum $marker {}

        impl ChannelKind for $marker {
            const CHANNEL: ChannelType = $channel;

            type Id = $id;
            type Record = $record;

            fn wrap(record: $record) -> Payload {
                Payload::$variant(record)
            }

            fn unwrap(payload: Payload) -> Option<$record> {
                match payload {
                    Payload::$variant(record) => Some(record),
                    _ => None,
                }
            }
        }
    };
}

channel_kind!(
    /// Actor lifecycle updates, keyed by actor.
    ActorChannel, ChannelType::Actor, ActorId, ActorRecord, Actor
);
channel_kind!(
    /// Job lifecycle updates, keyed by job.
    JobChannel, ChannelType::Job, JobId, JobRecord, Job
);
channel_kind!(
    /// Node membership changes, keyed by node.
    NodeInfoChannel, ChannelType::NodeInfo, NodeId, NodeInfoRecord, NodeInfo
);
channel_kind!(
    /// Worker failures, keyed by worker.
    WorkerDeltaChannel, ChannelType::WorkerDelta, WorkerId, WorkerDeltaRecord, WorkerDelta
);
channel_kind!(
    /// Errors pushed to drivers, keyed by a free-form string.
    ErrorInfoChannel, ChannelType::ErrorInfo, String, ErrorRecord, ErrorInfo
);
channel_kind!(
    /// Log streams, keyed by a free-form string.
    LogChannel, ChannelType::Log, String, LogBatch, LogBatch
);
