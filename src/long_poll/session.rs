//! Long-poll session state and reply processing.

use super::rpc::{CallContext, PollReply};
use crate::envelope::Envelope;
use crate::types::{ChannelType, PublisherId, SequenceId};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Mutable state of one long-poll session. Always accessed under the
/// subscriber's lock.
pub(crate) struct SessionState {
    /// Publisher epoch the sequence ids below belong to.
    pub(crate) publisher_id: PublisherId,
    pub(crate) max_processed_sequence_id: SequenceId,
    /// Accepted envelopes, drained FIFO.
    pub(crate) queue: VecDeque<Envelope>,
    /// Terminal.
    pub(crate) closed: bool,
    /// The outstanding poll, if any. Stored before the lock is released.
    pub(crate) in_flight: Option<Arc<CallContext>>,
    pub(crate) last_batch_size: usize,
}

/// Point-in-time view of a session, for monitoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub publisher_id: PublisherId,
    pub max_processed_sequence_id: SequenceId,
    pub queued: usize,
    pub last_batch_size: usize,
    pub closed: bool,
    pub in_flight: bool,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            publisher_id: PublisherId::default(),
            max_processed_sequence_id: SequenceId(0),
            queue: VecDeque::new(),
            closed: false,
            in_flight: None,
            last_batch_size: 0,
        }
    }

    /// Fold one poll reply into the session. Returns how many envelopes
    /// were enqueued.
    pub(crate) fn apply_reply(&mut self, reply: PollReply, channel_type: ChannelType) -> usize {
        if self.publisher_id != reply.publisher_id {
            if !self.publisher_id.is_empty() {
                debug!(
                    previous = %self.publisher_id,
                    current = %reply.publisher_id,
                    "publisher changed, expected only during failover"
                );
            }
            self.publisher_id = reply.publisher_id;
            self.max_processed_sequence_id = SequenceId(0);
        }

        self.last_batch_size = reply.messages.len();

        let mut enqueued = 0;
        for envelope in reply.messages {
            if envelope.sequence_id <= self.max_processed_sequence_id {
                warn!(
                    sequence_id = %envelope.sequence_id,
                    max_processed = %self.max_processed_sequence_id,
                    "ignoring out of order message"
                );
                continue;
            }
            self.max_processed_sequence_id = envelope.sequence_id;

            if envelope.channel_type != channel_type {
                warn!(
                    received = %envelope.channel_type,
                    subscribed = %channel_type,
                    "ignoring message from unsubscribed channel"
                );
                continue;
            }

            self.queue.push_back(envelope);
            enqueued += 1;
        }

        enqueued
    }

    pub(crate) fn stats(&self) -> SessionStats {
        SessionStats {
            publisher_id: self.publisher_id.clone(),
            max_processed_sequence_id: self.max_processed_sequence_id,
            queued: self.queue.len(),
            last_batch_size: self.last_batch_size,
            closed: self.closed,
            in_flight: self.in_flight.is_some(),
        }
    }
}
