//! Long-poll client for consumers outside the callback world.
//!
//! The client talks to the publisher's RPC surface directly:
//! - `register_subscriber` once, for one channel
//! - `poll` repeatedly; each reply names the publisher and carries
//!   sequence-numbered envelopes
//! - `unregister_subscriber` on close
//!
//! Sequence ids only compare within one publisher epoch. Anything at or
//! below the highest id processed is a retransmission and is dropped; a
//! reply from a different publisher resets progress to zero.
//!
//! # Example
//!
//! ```ignore
//! let config = LongPollConfig::new(ChannelType::Log, SubscriberId::from("sub-1"), worker_id);
//! let subscriber = LongPollSubscriber::connect(&connector, &endpoint, config)?;
//! subscriber.subscribe()?;
//!
//! loop {
//!     match subscriber.poll_logs(Some(Duration::from_secs(30)))? {
//!         Some((key, batch)) => print_lines(&key, &batch.lines()),
//!         None if subscriber.is_closed() => break,
//!         None => continue,
//!     }
//! }
//! ```

mod client;
mod rpc;
mod session;

pub use client::{LongPollConfig, LongPollSubscriber};
pub use rpc::{
    CallContext, Connector, PollReply, PollRequest, PubSubRpc, RegisterRequest, RpcResult,
    RpcStatus, StatusCode, UnregisterRequest,
};
pub use session::SessionStats;
