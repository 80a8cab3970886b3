//! Synchronous long-poll subscriber.

use super::rpc::{
    CallContext, Connector, PollRequest, PubSubRpc, RegisterRequest, UnregisterRequest,
};
use super::session::{SessionState, SessionStats};
use crate::channel::{ActorChannel, ChannelKind, ErrorInfoChannel, LogChannel};
use crate::envelope::Envelope;
use crate::error::{PubSubError, Result};
use crate::types::{ActorRecord, ChannelType, Endpoint, ErrorRecord, KeyId, LogBatch, SubscriberId};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Identity of a long-poll session.
#[derive(Clone, Debug)]
pub struct LongPollConfig {
    /// The one channel this session receives.
    pub channel_type: ChannelType,

    pub subscriber_id: SubscriberId,

    /// Process the subscription is registered on behalf of.
    pub sender_id: Vec<u8>,
}

impl LongPollConfig {
    pub fn new(
        channel_type: ChannelType,
        subscriber_id: SubscriberId,
        sender_id: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            channel_type,
            subscriber_id,
            sender_id: sender_id.into(),
        }
    }
}

/// Pull-style subscriber speaking the long-poll protocol directly.
///
/// Lifecycle is `new` (unsubscribed) -> `subscribe` (active) -> `close`
/// (closed, terminal). All session state sits behind one lock, which is
/// released while a poll RPC is outstanding so `close` never waits on it.
pub struct LongPollSubscriber<R: PubSubRpc> {
    rpc: R,
    channel_type: ChannelType,
    subscriber_id: SubscriberId,
    sender_id: Vec<u8>,
    state: Mutex<SessionState>,
    /// Signalled when the outstanding poll returns or the session closes.
    call_finished: Condvar,
}

impl<R: PubSubRpc> LongPollSubscriber<R> {
    /// Create a session over an existing stub. No network activity.
    pub fn new(rpc: R, config: LongPollConfig) -> Self {
        Self {
            rpc,
            channel_type: config.channel_type,
            subscriber_id: config.subscriber_id,
            sender_id: config.sender_id,
            state: Mutex::new(SessionState::new()),
            call_finished: Condvar::new(),
        }
    }

    /// Build a stub for `endpoint` and create a session over it.
    pub fn connect<C>(connector: &C, endpoint: &Endpoint, config: LongPollConfig) -> Result<Self>
    where
        C: Connector<Rpc = R>,
    {
        let rpc = connector.connect(endpoint)?;
        Ok(Self::new(rpc, config))
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    /// Register this session's channel with the publisher.
    ///
    /// Does not wait for data. A no-op once closed.
    pub fn subscribe(&self) -> Result<()> {
        // Held across the registration so it can't interleave with close().
        let state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        self.rpc.register_subscriber(RegisterRequest {
            subscriber_id: self.subscriber_id.clone(),
            sender_id: self.sender_id.clone(),
            channel_type: self.channel_type,
        })?;

        debug!(
            subscriber_id = %self.subscriber_id,
            channel_type = %self.channel_type,
            "registered long-poll subscriber"
        );
        Ok(())
    }

    /// Next envelope in arrival order, polling the publisher while the
    /// local queue is empty.
    ///
    /// `timeout` bounds the whole call, including time spent waiting on
    /// another poller's outstanding RPC.
    ///
    /// `Ok(None)` means no data this round (timeout, publisher unavailable,
    /// cancelled) or the session is closed; poll again unless closed.
    /// Other RPC failures are returned as errors and are not retried.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<Option<Envelope>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        loop {
            if let Some(envelope) = state.queue.pop_front() {
                return Ok(Some(envelope));
            }
            if state.closed {
                return Ok(None);
            }
            if state.in_flight.is_some() {
                // Another poller owns the RPC; its results land in our queue.
                match deadline {
                    Some(at) => {
                        let timed_out = self.call_finished.wait_until(&mut state, at).timed_out();
                        if timed_out && state.queue.is_empty() {
                            trace!("deadline passed waiting on another poller");
                            return Ok(None);
                        }
                    }
                    None => self.call_finished.wait(&mut state),
                }
                continue;
            }

            let call = Arc::new(CallContext::new(deadline));
            state.in_flight = Some(Arc::clone(&call));

            let request = PollRequest {
                subscriber_id: self.subscriber_id.clone(),
                max_processed_sequence_id: state.max_processed_sequence_id,
                publisher_id: state.publisher_id.clone(),
            };

            drop(state);
            let outcome = self.rpc.poll(request, &call);
            state = self.state.lock();

            state.in_flight = None;
            self.call_finished.notify_all();

            match outcome {
                Ok(reply) => {
                    let received = reply.messages.len();
                    let enqueued = state.apply_reply(reply, self.channel_type);
                    trace!(received, enqueued, "poll round");
                }
                Err(status) if status.code.is_transient() => {
                    debug!(code = %status.code, "poll round ended without data");
                    return Ok(None);
                }
                Err(status) => return Err(PubSubError::from(status)),
            }
        }
    }

    /// Poll and unwrap as channel `C`.
    ///
    /// Returns the envelope's raw key and record. Fails with
    /// `ChannelMismatch` if this session isn't registered for `C`.
    pub fn poll_channel<C: ChannelKind>(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<(KeyId, C::Record)>> {
        if C::CHANNEL != self.channel_type {
            return Err(PubSubError::ChannelMismatch {
                expected: self.channel_type,
                got: C::CHANNEL,
            });
        }

        match self.poll(timeout)? {
            Some(mut envelope) => {
                let key_id = std::mem::take(&mut envelope.key_id);
                let record = envelope.into_record::<C>()?;
                Ok(Some((key_id, record)))
            }
            None => Ok(None),
        }
    }

    pub fn poll_actor(&self, timeout: Option<Duration>) -> Result<Option<(KeyId, ActorRecord)>> {
        self.poll_channel::<ActorChannel>(timeout)
    }

    pub fn poll_error(&self, timeout: Option<Duration>) -> Result<Option<(KeyId, ErrorRecord)>> {
        self.poll_channel::<ErrorInfoChannel>(timeout)
    }

    pub fn poll_logs(&self, timeout: Option<Duration>) -> Result<Option<(KeyId, LogBatch)>> {
        self.poll_channel::<LogChannel>(timeout)
    }

    /// Close the session.
    ///
    /// Cancels any outstanding poll without waiting for it, then tells the
    /// publisher to drop the subscriber. Unregistration failures are logged.
    pub fn close(&self) {
        let in_flight = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.in_flight.clone()
        };
        self.call_finished.notify_all();

        if let Some(call) = in_flight {
            call.cancel();
        }

        let request = UnregisterRequest {
            subscriber_id: self.subscriber_id.clone(),
        };
        if let Err(status) = self.rpc.unregister_subscriber(request) {
            warn!(
                subscriber_id = %self.subscriber_id,
                code = %status.code,
                message = %status.message,
                "error while unregistering the subscriber"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Size of the most recent poll reply, before any filtering.
    pub fn last_batch_size(&self) -> usize {
        self.state.lock().last_batch_size
    }

    pub fn stats(&self) -> SessionStats {
        self.state.lock().stats()
    }
}
