//! Background writer that applies tracker writes to the store in order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use storage::document::{Document, DocumentPath};
use storage::{DocumentStore, StorageError, WriteBatch};

use super::state::TrackerEvent;
use crate::error::{WriteFailure, WriteKind};

pub(crate) enum WriteOp {
    Set(DocumentPath, Document),
    Merge(DocumentPath, Document),
    Batch(WriteBatch),
    /// Resolves once every write queued before it has been applied.
    Barrier,
}

struct Job {
    kind: WriteKind,
    session_id: String,
    op: WriteOp,
    ack: oneshot::Sender<Result<(), WriteFailure>>,
}

/// Handle to one or more queued store writes.
///
/// Dropping it leaves the writes running in the background; awaiting
/// [`PendingWrite::wait`] reports how they went.
#[derive(Debug, Default)]
pub struct PendingWrite {
    parts: Vec<Part>,
}

#[derive(Debug)]
enum Part {
    Failed(WriteFailure),
    Queued {
        kind: WriteKind,
        session_id: String,
        rx: oneshot::Receiver<Result<(), WriteFailure>>,
    },
}

impl PendingWrite {
    /// A handle for an operation that had nothing to write.
    #[must_use]
    pub fn nothing() -> Self {
        Self::default()
    }

    pub(crate) fn and(mut self, other: PendingWrite) -> Self {
        self.parts.extend(other.parts);
        self
    }

    /// Wait for every write behind this handle to be applied.
    ///
    /// # Errors
    ///
    /// Returns the first `WriteFailure` reported by the store, or one
    /// describing a writer that stopped before applying the write.
    pub async fn wait(self) -> Result<(), WriteFailure> {
        let mut first_error = None;
        for part in self.parts {
            let result = match part {
                Part::Failed(failure) => Err(failure),
                Part::Queued {
                    kind,
                    session_id,
                    rx,
                } => rx.await.unwrap_or_else(|_| {
                    Err(WriteFailure {
                        kind,
                        session_id,
                        message: "writer stopped before applying the write".into(),
                    })
                }),
            };
            if let Err(failure) = result {
                first_error.get_or_insert(failure);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Sending half of a tracker's write queue. One writer task drains it.
pub(crate) struct WriteQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteQueue {
    /// Spawn the writer task on the current tokio runtime.
    pub(crate) fn spawn(
        store: Arc<dyn DocumentStore>,
        sink: Option<mpsc::UnboundedSender<WriteFailure>>,
        events: broadcast::Sender<TrackerEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, store, sink, events));
        Self { tx }
    }

    pub(crate) fn enqueue(&self, kind: WriteKind, session_id: &str, op: WriteOp) -> PendingWrite {
        let (ack, rx) = oneshot::channel();
        let job = Job {
            kind,
            session_id: session_id.to_string(),
            op,
            ack,
        };
        if self.tx.send(job).is_err() {
            let failure = WriteFailure {
                kind,
                session_id: session_id.to_string(),
                message: "writer is no longer running".into(),
            };
            warn!(%failure, "dropping write");
            return PendingWrite {
                parts: vec![Part::Failed(failure)],
            };
        }
        PendingWrite {
            parts: vec![Part::Queued {
                kind,
                session_id: session_id.to_string(),
                rx,
            }],
        }
    }
}

async fn apply(store: &dyn DocumentStore, op: WriteOp) -> Result<(), StorageError> {
    match op {
        WriteOp::Set(path, doc) => store.set(&path, doc).await,
        WriteOp::Merge(path, doc) => store.merge(&path, doc).await,
        WriteOp::Batch(batch) if batch.is_empty() => Ok(()),
        WriteOp::Batch(batch) => store.commit(batch).await,
        WriteOp::Barrier => Ok(()),
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Job>,
    store: Arc<dyn DocumentStore>,
    sink: Option<mpsc::UnboundedSender<WriteFailure>>,
    events: broadcast::Sender<TrackerEvent>,
) {
    while let Some(job) = rx.recv().await {
        let result = match apply(store.as_ref(), job.op).await {
            Ok(()) => {
                debug!(kind = %job.kind, session_id = %job.session_id, "write applied");
                Ok(())
            }
            Err(e) => {
                let failure = WriteFailure {
                    kind: job.kind,
                    session_id: job.session_id,
                    message: e.to_string(),
                };
                warn!(%failure, "store write failed");
                if let Some(sink) = &sink {
                    let _ = sink.send(failure.clone());
                }
                let _ = events.send(TrackerEvent::WriteFailed(failure.clone()));
                Err(failure)
            }
        };
        // The caller may have dropped its handle; that is fine.
        let _ = job.ack.send(result);
    }
}
