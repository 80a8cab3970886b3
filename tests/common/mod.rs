//! Shared fixtures for integration tests.

#![allow(dead_code)]

use control_pubsub::{
    ActorRecord, CallContext, ChannelType, Envelope, ErrorRecord, KeyId, LogBatch, Payload,
    PollReply, PollRequest, PubSubRpc, PublisherId, RegisterRequest, RpcResult, RpcStatus,
    SequenceId, UnregisterRequest,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// What the fake publisher does for one poll.
pub enum Step {
    Reply(PollReply),
    Fail(RpcStatus),
    /// Hold the call open until it is cancelled or its deadline passes.
    Hang,
}

/// What the fake does once the script runs out.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WhenExhausted {
    DeadlineExceeded,
    Hang,
}

/// Scripted stand-in for the publisher's long-poll service.
pub struct ScriptedRpc {
    steps: Mutex<VecDeque<Step>>,
    when_exhausted: WhenExhausted,
    pub registrations: Mutex<Vec<RegisterRequest>>,
    pub polls: Mutex<Vec<PollRequest>>,
    pub unregistrations: Mutex<Vec<UnregisterRequest>>,
    register_error: Mutex<Option<RpcStatus>>,
    unregister_error: Mutex<Option<RpcStatus>>,
    poll_started_tx: Sender<()>,
    pub poll_started: Receiver<()>,
}

impl ScriptedRpc {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_exhaustion(steps, WhenExhausted::DeadlineExceeded)
    }

    pub fn with_exhaustion(steps: Vec<Step>, when_exhausted: WhenExhausted) -> Self {
        let (tx, rx) = unbounded();
        Self {
            steps: Mutex::new(steps.into()),
            when_exhausted,
            registrations: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            unregistrations: Mutex::new(Vec::new()),
            register_error: Mutex::new(None),
            unregister_error: Mutex::new(None),
            poll_started_tx: tx,
            poll_started: rx,
        }
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }

    pub fn fail_register_with(&self, status: RpcStatus) {
        *self.register_error.lock() = Some(status);
    }

    pub fn fail_unregister_with(&self, status: RpcStatus) {
        *self.unregister_error.lock() = Some(status);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().len()
    }

    fn hang(call: &CallContext) -> RpcResult<PollReply> {
        match call.wait(None) {
            Some(status) => Err(status),
            None => Ok(PollReply::default()),
        }
    }
}

impl PubSubRpc for ScriptedRpc {
    fn register_subscriber(&self, request: RegisterRequest) -> RpcResult<()> {
        self.registrations.lock().push(request);
        match self.register_error.lock().clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn poll(&self, request: PollRequest, call: &CallContext) -> RpcResult<PollReply> {
        self.polls.lock().push(request);
        let _ = self.poll_started_tx.send(());

        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(status)) => Err(status),
            Some(Step::Hang) => Self::hang(call),
            None => match self.when_exhausted {
                WhenExhausted::DeadlineExceeded => Err(RpcStatus::deadline_exceeded()),
                WhenExhausted::Hang => Self::hang(call),
            },
        }
    }

    fn unregister_subscriber(&self, request: UnregisterRequest) -> RpcResult<()> {
        self.unregistrations.lock().push(request);
        match self.unregister_error.lock().clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

pub fn reply(publisher: &str, messages: Vec<Envelope>) -> PollReply {
    PollReply {
        publisher_id: PublisherId::from(publisher),
        messages,
    }
}

pub fn actor_envelope(key: &str, seq: u64) -> Envelope {
    Envelope::new(
        ChannelType::Actor,
        KeyId::from(key),
        Payload::Actor(ActorRecord {
            name: format!("actor-{}", seq),
            ..Default::default()
        }),
    )
    .with_sequence(SequenceId(seq))
}

pub fn error_envelope(key: &str, seq: u64) -> Envelope {
    Envelope::new(
        ChannelType::ErrorInfo,
        KeyId::from(key),
        Payload::ErrorInfo(ErrorRecord {
            error_message: format!("error {}", seq),
            ..Default::default()
        }),
    )
    .with_sequence(SequenceId(seq))
}

pub fn log_envelope(key: &str, seq: u64, lines: &[&str]) -> Envelope {
    Envelope::new(
        ChannelType::Log,
        KeyId::from(key),
        Payload::LogBatch(LogBatch {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }),
    )
    .with_sequence(SequenceId(seq))
}
