//! Core types shared by the publisher, subscriber and long-poll client.

use crate::error::{PubSubError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key identifying the entity an envelope is about.
///
/// Empty for whole-channel traffic, the entity's binary id otherwise.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub Vec<u8>);

impl KeyId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        KeyId(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        KeyId(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for KeyId {
    fn from(b: &[u8]) -> Self {
        KeyId(b.to_vec())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Position of an envelope within one publisher epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SequenceId(pub u64);

impl fmt::Debug for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one publisher process instance (an epoch).
///
/// Empty until the first poll reply names the publisher.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublisherId(pub Vec<u8>);

impl PublisherId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PublisherId {
    fn from(s: &str) -> Self {
        PublisherId(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublisherId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Identity of a long-poll subscriber session (also used for sender ids).
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub Vec<u8>);

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        SubscriberId(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Network address of a publisher.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", 6379)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Categories of control-plane events multiplexed over one transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ChannelType {
    Actor,
    Job,
    NodeInfo,
    WorkerDelta,
    ErrorInfo,
    Log,
}

impl ChannelType {
    pub const ALL: [ChannelType; 6] = [
        ChannelType::Actor,
        ChannelType::Job,
        ChannelType::NodeInfo,
        ChannelType::WorkerDelta,
        ChannelType::ErrorInfo,
        ChannelType::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Actor => "ACTOR",
            ChannelType::Job => "JOB",
            ChannelType::NodeInfo => "NODE_INFO",
            ChannelType::WorkerDelta => "WORKER_DELTA",
            ChannelType::ErrorInfo => "ERROR_INFO",
            ChannelType::Log => "LOG",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! binary_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Width of the binary form in bytes.
            pub const SIZE: usize = $len;

            pub fn from_binary(bytes: &[u8]) -> Result<Self> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    PubSubError::InvalidKey(format!(
                        "{} expects {} bytes, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok($name(arr))
            }

            pub fn binary(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            pub fn hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self> {
                let bytes = hex::decode(s).map_err(|e| PubSubError::InvalidKey(e.to_string()))?;
                Self::from_binary(&bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.hex())
            }
        }
    };
}

binary_id!(
    /// Job identifier.
    JobId,
    4
);
binary_id!(
    /// Actor identifier.
    ActorId,
    16
);
binary_id!(
    /// Node identifier.
    NodeId,
    28
);
binary_id!(
    /// Worker identifier.
    WorkerId,
    28
);

// --- Domain records ---
//
// Payload contents are owned by the control service; this layer only moves
// them around.

/// Lifecycle state of an actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorState {
    #[default]
    DependenciesUnready,
    PendingCreation,
    Alive,
    Restarting,
    Dead,
}

/// Actor table entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub state: ActorState,
    pub name: String,
    pub class_name: String,
    pub num_restarts: u64,
}

/// Job table entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub is_dead: bool,
    pub entrypoint: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
}

/// Liveness of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Alive,
    Dead,
}

/// Node membership entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfoRecord {
    pub state: NodeState,
    pub node_name: String,
    pub address: String,
    pub port: u16,
}

/// Worker failure notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerDeltaRecord {
    pub node_address: String,
    pub exit_type: String,
    pub exit_detail: String,
}

/// Error pushed to a driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub job_id: Vec<u8>,
    pub error_type: String,
    pub error_message: String,
    pub timestamp_ms: u64,
}

/// A batch of log lines from one process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    pub ip: String,
    pub pid: String,
    pub job_id: String,
    pub is_error: bool,
    pub lines: Vec<String>,
    pub actor_name: String,
    pub task_name: String,
}

impl LogBatch {
    /// Owned copy of the batch's lines, for consumers that can't borrow.
    pub fn lines(&self) -> Vec<String> {
        self.lines.clone()
    }
}
