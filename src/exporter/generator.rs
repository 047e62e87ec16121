//! Archive generation: drives a transform over a result collection and
//! streams the produced bytes to the caller.
//!
//! Failure handling is two-phase. Before the first chunk is delivered the
//! caller has received nothing, so the error is sent through the chunk
//! channel and surfaces as a synchronous failure. After the first chunk the
//! response is already underway; the stream is truncated and the requester
//! is told out of band through the notifier.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, GenerationError, Result};
use crate::exporter::jobs::ExportJob;
use crate::exporter::notifications::Notifier;
use crate::plugins::ExportTransform;
use crate::results::ResultCollection;
use crate::types::Event;

/// Receiving end of a job's chunk channel.
///
/// The first item decides the caller's fate: `Ok(chunk)` means the export is
/// streaming, `Err` means it failed before producing anything. Later `Err`
/// items truncate the stream.
pub type ChunkReceiver = mpsc::Receiver<Result<Vec<u8>>>;

/// Write side of a job's chunk channel, handed to the transform.
///
/// Sending the first non-empty chunk moves the job from Init to Streaming.
/// Delivery applies backpressure: `send` suspends while the caller is slow
/// to drain, and fails once the caller has gone away.
pub struct ChunkSink {
    job: Arc<ExportJob>,
    tx: mpsc::Sender<Result<Vec<u8>>>,
    event_tx: broadcast::Sender<Event>,
    chunk_size: usize,
}

impl ChunkSink {
    pub(crate) fn new(
        job: Arc<ExportJob>,
        tx: mpsc::Sender<Result<Vec<u8>>>,
        event_tx: broadcast::Sender<Event>,
        chunk_size: usize,
    ) -> Self {
        Self {
            job,
            tx,
            event_tx,
            chunk_size,
        }
    }

    /// Preferred chunk size for transforms that buffer before emitting.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks delivered so far on this job.
    pub fn chunks_emitted(&self) -> u64 {
        self.job.chunks_emitted()
    }

    /// Deliver one chunk to the caller. Empty chunks are dropped without
    /// touching the job state.
    pub async fn send(&mut self, chunk: Vec<u8>) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len();
        let delivered = tokio::select! {
            _ = self.job.cancel.cancelled() => false,
            sent = self.tx.send(Ok(chunk)) => sent.is_ok(),
        };
        if !delivered {
            return Err(GenerationError::CallerDisconnected {
                job_id: self.job.id,
            }
            .into());
        }
        if self.job.begin_streaming() {
            debug!(job_id = %self.job.id, "first chunk delivered, job streaming");
            let _ = self.event_tx.send(Event::JobStreaming { id: self.job.id });
        }
        self.job.record_chunk(len);
        Ok(())
    }
}

/// Runs generation jobs on background tasks.
pub(crate) struct ArchiveGenerator {
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    notifier: Arc<Notifier>,
}

impl ArchiveGenerator {
    pub(crate) fn new(
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            config,
            event_tx,
            notifier,
        }
    }

    /// Start the generation task for an admitted job and return the chunk
    /// channel the caller drains.
    pub(crate) fn spawn(
        &self,
        job: Arc<ExportJob>,
        collection: Arc<dyn ResultCollection>,
        transform: Arc<dyn ExportTransform>,
        params: HashMap<String, String>,
    ) -> ChunkReceiver {
        let (tx, rx) = mpsc::channel(self.config.export.channel_capacity);
        let sink = ChunkSink::new(
            job.clone(),
            tx.clone(),
            self.event_tx.clone(),
            self.config.export.chunk_size,
        );
        let event_tx = self.event_tx.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            run(job, collection, transform, params, sink, tx, event_tx, notifier).await;
        });
        rx
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    job: Arc<ExportJob>,
    collection: Arc<dyn ResultCollection>,
    transform: Arc<dyn ExportTransform>,
    params: HashMap<String, String>,
    mut sink: ChunkSink,
    tx: mpsc::Sender<Result<Vec<u8>>>,
    event_tx: broadcast::Sender<Event>,
    notifier: Arc<Notifier>,
) {
    let result = tokio::select! {
        _ = job.cancel.cancelled() => Err(Error::ShuttingDown),
        res = transform.generate(collection, &params, &mut sink) => res,
    };

    match result {
        Ok(()) => {
            job.complete();
            info!(
                job_id = %job.id,
                chunks = job.chunks_emitted(),
                bytes = job.bytes_emitted(),
                "export complete"
            );
            let _ = event_tx.send(Event::JobComplete {
                id: job.id,
                bytes_emitted: job.bytes_emitted(),
            });
            notifier.job_complete(&job);
        }
        Err(err) => {
            let chunks = job.chunks_emitted();
            let reason = err.to_string();
            // Disconnects and shutdowns are not generation faults; nobody is
            // waiting for the result, so skip the out-of-band notification.
            let silent = matches!(
                err,
                Error::Generation(GenerationError::CallerDisconnected { .. })
                    | Error::ShuttingDown
            );
            job.fail(&reason);
            let _ = event_tx.send(Event::JobFailed {
                id: job.id,
                error: reason.clone(),
                chunks_emitted: chunks,
            });

            if silent {
                warn!(job_id = %job.id, chunks, %reason, "export abandoned");
                return;
            }

            if chunks == 0 {
                // Nothing delivered yet; the caller is still waiting on the
                // first channel item and gets the error synchronously.
                warn!(job_id = %job.id, %reason, "export failed before streaming");
                let failure = GenerationError::PreStream {
                    job_id: job.id,
                    reason: reason.clone(),
                };
                let _ = tx.send(Err(failure.into())).await;
            } else {
                // Output already underway; truncate the stream. Partial
                // output is not a valid archive.
                warn!(job_id = %job.id, chunks, %reason, "export failed mid-stream, truncating");
                let failure = GenerationError::MidStream {
                    job_id: job.id,
                    chunks_emitted: chunks,
                    reason: reason.clone(),
                };
                // Blocking send: a slow reader must still see the error
                // marker instead of a clean end of stream. Errors out
                // immediately if the reader is gone.
                let _ = tx.send(Err(failure.into())).await;
            }
            notifier.job_failed(&job, &reason);
        }
    }
}
