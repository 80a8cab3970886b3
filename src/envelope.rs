//! The unit exchanged over the wire and between layers.

use crate::channel::ChannelKind;
use crate::error::{PubSubError, Result};
use crate::types::{
    ActorRecord, ChannelType, ErrorRecord, JobRecord, KeyId, LogBatch, NodeInfoRecord,
    SequenceId, WorkerDeltaRecord,
};
use serde::{Deserialize, Serialize};

/// Exactly one typed value, selected by the envelope's channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Actor(ActorRecord),
    Job(JobRecord),
    NodeInfo(NodeInfoRecord),
    WorkerDelta(WorkerDeltaRecord),
    ErrorInfo(ErrorRecord),
    LogBatch(LogBatch),
}

impl Payload {
    /// The channel this payload belongs on.
    pub fn channel_type(&self) -> ChannelType {
        match self {
            Payload::Actor(_) => ChannelType::Actor,
            Payload::Job(_) => ChannelType::Job,
            Payload::NodeInfo(_) => ChannelType::NodeInfo,
            Payload::WorkerDelta(_) => ChannelType::WorkerDelta,
            Payload::ErrorInfo(_) => ChannelType::ErrorInfo,
            Payload::LogBatch(_) => ChannelType::Log,
        }
    }
}

/// A channel-multiplexed message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel_type: ChannelType,
    /// Empty for whole-channel traffic.
    pub key_id: KeyId,
    /// Assigned by the publisher; zero until then.
    pub sequence_id: SequenceId,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(channel_type: ChannelType, key_id: KeyId, payload: Payload) -> Self {
        Self {
            channel_type,
            key_id,
            sequence_id: SequenceId::default(),
            payload,
        }
    }

    pub fn with_sequence(mut self, sequence_id: SequenceId) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    /// Whether the payload's type matches the declared channel.
    pub fn is_consistent(&self) -> bool {
        self.payload.channel_type() == self.channel_type
    }

    /// Unwrap the payload as channel `C`'s record type.
    pub fn into_record<C: ChannelKind>(self) -> Result<C::Record> {
        let found = self.payload.channel_type();
        C::unwrap(self.payload).ok_or_else(|| {
            PubSubError::ProtocolViolation(format!(
                "expected {} payload, envelope carries {}",
                C::CHANNEL,
                found
            ))
        })
    }
}
