//! Typed publisher mapping domain events onto channel envelopes.

use crate::channel::{
    ActorChannel, ChannelKind, EntityKey, ErrorInfoChannel, JobChannel, LogChannel,
    NodeInfoChannel, WorkerDeltaChannel,
};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::transport::{StatusCallback, Transport};
use crate::types::{
    ActorId, ActorRecord, ErrorRecord, JobId, JobRecord, LogBatch, NodeId, NodeInfoRecord,
    WorkerDeltaRecord, WorkerId,
};
use std::sync::Arc;
use tracing::trace;

/// Publishes control-plane events through a transport.
///
/// Publishing is fire-and-forget. The `done` callback reports that the
/// envelope was handed to the transport, not that anyone received it, and
/// a failure inside the transport is not observable here.
pub struct Publisher<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Publisher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Publish `record` on channel `C` under `id`'s binary key.
    pub fn publish<C: ChannelKind>(
        &self,
        id: &C::Id,
        record: C::Record,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        let envelope = Envelope::new(C::CHANNEL, id.to_key(), C::wrap(record));

        let channel_type = C::CHANNEL;
        trace!(%channel_type, key = %envelope.key_id, "publish");
        self.transport.publish(envelope);

        if let Some(done) = done {
            done(Ok(()));
        }
        Ok(())
    }

    pub fn publish_actor(
        &self,
        id: &ActorId,
        record: ActorRecord,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        self.publish::<ActorChannel>(id, record, done)
    }

    pub fn publish_job(
        &self,
        id: &JobId,
        record: JobRecord,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        self.publish::<JobChannel>(id, record, done)
    }

    pub fn publish_node_info(
        &self,
        id: &NodeId,
        record: NodeInfoRecord,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        self.publish::<NodeInfoChannel>(id, record, done)
    }

    pub fn publish_worker_failure(
        &self,
        id: &WorkerId,
        record: WorkerDeltaRecord,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        self.publish::<WorkerDeltaChannel>(id, record, done)
    }

    /// Error keys are free-form (usually a job id in hex).
    pub fn publish_error(
        &self,
        id: &str,
        record: ErrorRecord,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        self.publish::<ErrorInfoChannel>(&id.to_string(), record, done)
    }

    pub fn publish_logs(
        &self,
        id: &str,
        batch: LogBatch,
        done: Option<StatusCallback>,
    ) -> Result<()> {
        self.publish::<LogChannel>(&id.to_string(), batch, done)
    }

    /// The transport's registry summary.
    pub fn debug_string(&self) -> String {
        self.transport.debug_string()
    }
}
