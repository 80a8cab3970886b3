//! Remote publisher RPC surface used by the long-poll client.

use crate::envelope::Envelope;
use crate::error::Result;
use crate::types::{ChannelType, Endpoint, PublisherId, SequenceId, SubscriberId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// RPC status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// Outcomes a poller treats as "no data this round".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StatusCode::DeadlineExceeded | StatusCode::Unavailable | StatusCode::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed RPC outcome.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(StatusCode::Cancelled, "call cancelled")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(StatusCode::DeadlineExceeded, "deadline exceeded")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }
}

pub type RpcResult<T> = std::result::Result<T, RpcStatus>;

/// One-shot registration of a long-poll subscriber for one channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub subscriber_id: SubscriberId,
    pub sender_id: Vec<u8>,
    pub channel_type: ChannelType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollRequest {
    pub subscriber_id: SubscriberId,
    pub max_processed_sequence_id: SequenceId,
    /// Empty until a reply has named the publisher.
    pub publisher_id: PublisherId,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PollReply {
    pub publisher_id: PublisherId,
    pub messages: Vec<Envelope>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub subscriber_id: SubscriberId,
}

/// Deadline and cancellation for one outstanding call.
///
/// `cancel()` may come from any thread. Implementations of
/// [`PubSubRpc::poll`] watch [`CallContext::cancelled`] (it disconnects on
/// cancel) or block in [`CallContext::wait`].
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
}

impl CallContext {
    pub fn new(deadline: Option<Instant>) -> Self {
        let (tx, rx) = bounded(0);
        Self {
            deadline,
            cancelled: AtomicBool::new(false),
            cancel_tx: Mutex::new(Some(tx)),
            cancel_rx: rx,
        }
    }

    /// Deadline `timeout` from now; `None` means no deadline.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self::new(timeout.map(|t| Instant::now() + t))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel the call. Never blocks; idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_tx.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Disconnects when the call is cancelled. Nothing is ever sent on it.
    pub fn cancelled(&self) -> &Receiver<()> {
        &self.cancel_rx
    }

    /// Block until the call is cancelled, its deadline passes, or `limit`
    /// elapses. Returns the status the call should end with, or `None` if
    /// only `limit` ran out.
    pub fn wait(&self, limit: Option<Duration>) -> Option<RpcStatus> {
        if self.is_cancelled() {
            return Some(RpcStatus::cancelled());
        }

        let limit_at = limit.map(|l| Instant::now() + l);
        let wake_at = match (self.deadline, limit_at) {
            (Some(d), Some(l)) => Some(d.min(l)),
            (d, l) => d.or(l),
        };

        match wake_at {
            None => {
                // Only a disconnect ends this recv.
                let _ = self.cancel_rx.recv();
                Some(RpcStatus::cancelled())
            }
            Some(at) => match self.cancel_rx.recv_deadline(at) {
                Err(RecvTimeoutError::Timeout) => {
                    if self.deadline.is_some_and(|d| d <= at) {
                        Some(RpcStatus::deadline_exceeded())
                    } else {
                        None
                    }
                }
                _ => Some(RpcStatus::cancelled()),
            },
        }
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("deadline", &self.deadline)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Client stub for the remote publisher's long-poll service.
pub trait PubSubRpc: Send + Sync {
    fn register_subscriber(&self, request: RegisterRequest) -> RpcResult<()>;

    /// Long poll. May legitimately return an empty reply or time out.
    fn poll(&self, request: PollRequest, call: &CallContext) -> RpcResult<PollReply>;

    fn unregister_subscriber(&self, request: UnregisterRequest) -> RpcResult<()>;
}

impl<R: PubSubRpc + ?Sized> PubSubRpc for Arc<R> {
    fn register_subscriber(&self, request: RegisterRequest) -> RpcResult<()> {
        (**self).register_subscriber(request)
    }

    fn poll(&self, request: PollRequest, call: &CallContext) -> RpcResult<PollReply> {
        (**self).poll(request, call)
    }

    fn unregister_subscriber(&self, request: UnregisterRequest) -> RpcResult<()> {
        (**self).unregister_subscriber(request)
    }
}

/// Builds RPC stubs from a publisher address.
pub trait Connector {
    type Rpc: PubSubRpc;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Rpc>;
}
