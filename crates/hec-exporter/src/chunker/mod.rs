use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::encode::{self, EncodeError};

/// Chunks that may sit encoded but unsent while the consumer is busy.
const CHUNK_QUEUE_DEPTH: usize = 2;

/// Records encoded between cooperative yields to the scheduler.
const YIELD_EVERY: usize = 256;

/// A contiguous run of records encoded as one HEC body.
#[derive(Debug)]
pub struct Chunk {
    /// Position of this chunk in the stream, starting at 0.
    pub index: usize,
    /// Offset of the chunk's first record in the batch.
    pub start: usize,
    /// Number of records in the chunk.
    pub records: usize,
    pub body: Bytes,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Terminal chunk: the record at `source.index` could not be encoded.
#[derive(Debug, Error)]
#[error("log chunk starting at record {start} could not be encoded: {source}")]
pub struct ChunkError {
    /// First record not yet handed out in a chunk.
    pub start: usize,
    #[source]
    pub source: EncodeError,
}

/// Lazily produced, size-bounded chunks of a log batch.
///
/// Encoding runs on a background task feeding a bounded channel, so the next
/// chunk is built while the previous one is in flight. Dropping the stream,
/// calling [`ChunkStream::close`] or cancelling the parent token stops the
/// producer.
pub struct ChunkStream {
    rx: mpsc::Receiver<Result<Chunk, ChunkError>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChunkStream {
    /// Start chunking `events`. A `max_content_length` of 0 puts every record
    /// in a single chunk. The producer stops as soon as `parent` is cancelled.
    pub fn spawn<E>(
        events: Arc<[E]>,
        max_content_length: usize,
        parent: &CancellationToken,
    ) -> Self
    where
        E: Serialize + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
        let cancel = parent.child_token();
        let task = tokio::spawn(produce(events, max_content_length, tx, cancel.clone()));
        Self {
            rx,
            cancel,
            task: Some(task),
        }
    }

    /// The next chunk, or `None` once the batch is exhausted.
    ///
    /// After an `Err` the stream yields nothing further.
    pub async fn next(&mut self) -> Option<Result<Chunk, ChunkError>> {
        self.rx.recv().await
    }

    /// Stop the producer and wait for its task to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        self.rx.close();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "log chunk producer panicked");
        }
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn produce<E: Serialize>(
    events: Arc<[E]>,
    max_content_length: usize,
    tx: mpsc::Sender<Result<Chunk, ChunkError>>,
    cancel: CancellationToken,
) {
    let mut buf = Vec::new();
    let mut record = Vec::new();
    let mut index = 0;
    let mut start = 0;

    for (i, event) in events.iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(chunk = index, record = i, "log chunk producer cancelled");
            return;
        }
        if i > 0 && i % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }

        record.clear();
        if let Err(source) = encode::append_event(&mut record, event) {
            let err = ChunkError {
                start,
                source: EncodeError { index: i, source },
            };
            deliver(&tx, &cancel, Err(err)).await;
            return;
        }

        // A record never straddles chunks; one that is oversized on its own
        // still gets a chunk to itself.
        if max_content_length > 0
            && !buf.is_empty()
            && buf.len() + record.len() > max_content_length
        {
            let chunk = Chunk {
                index,
                start,
                records: i - start,
                body: Bytes::from(std::mem::take(&mut buf)),
            };
            if !deliver(&tx, &cancel, Ok(chunk)).await {
                return;
            }
            index += 1;
            start = i;
        }
        buf.extend_from_slice(&record);
    }

    let chunk = Chunk {
        index,
        start,
        records: events.len() - start,
        body: Bytes::from(buf),
    };
    deliver(&tx, &cancel, Ok(chunk)).await;
}

/// Returns `false` when the consumer is gone or has asked us to stop.
async fn deliver(
    tx: &mpsc::Sender<Result<Chunk, ChunkError>>,
    cancel: &CancellationToken,
    item: Result<Chunk, ChunkError>,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
