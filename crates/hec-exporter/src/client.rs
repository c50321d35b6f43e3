use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::chunker::ChunkStream;
use crate::compression::{self, CompressorPool};
use crate::config::Config;
use crate::encode;
use crate::error::{ExportError, PushError};
use crate::event::{Batch, EventRecord};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::transport::{BuildError, HecTransport};

/// Delivers event batches to a Splunk HEC endpoint.
///
/// Safe to share between tasks; each push owns its batch for the duration of
/// the call.
pub struct HecClient {
    transport: HecTransport,
    zippers: CompressorPool,
    lifecycle: Lifecycle,
    disable_compression: bool,
    max_content_length: usize,
}

impl HecClient {
    pub fn new(config: &Config) -> Result<Self, BuildError> {
        Ok(Self {
            transport: HecTransport::new(config)?,
            zippers: CompressorPool::default(),
            lifecycle: Lifecycle::new(),
            disable_compression: config.disable_compression,
            max_content_length: config.max_content_length,
        })
    }

    pub fn start(&self) {
        self.lifecycle.start();
    }

    /// Wait for every in-flight push to finish. Pushes started afterwards are
    /// rejected.
    pub async fn stop(&self) {
        self.lifecycle.stop().await;
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Send converted metric events as a single body.
    ///
    /// Returns the converter's drop count on success.
    pub async fn push_metrics<E: EventRecord>(
        &self,
        cancel: &CancellationToken,
        batch: Batch<E>,
    ) -> Result<usize, PushError<E>> {
        self.push_events(cancel, batch, "metrics").await
    }

    /// Send converted span events as a single body.
    ///
    /// Returns the converter's drop count on success.
    pub async fn push_traces<E: EventRecord>(
        &self,
        cancel: &CancellationToken,
        batch: Batch<E>,
    ) -> Result<usize, PushError<E>> {
        self.push_events(cancel, batch, "traces").await
    }

    /// Stream log events in chunks of at most `max_content_length` bytes.
    ///
    /// Chunks are sent in order and the push stops at the first failure. When
    /// a chunk cannot be delivered, the error carries every record from that
    /// chunk onward; records in earlier chunks were accepted and are not
    /// reported again. Cancelling `cancel` also stops chunk encoding.
    pub async fn push_logs<E: EventRecord>(
        &self,
        cancel: &CancellationToken,
        batch: Batch<E>,
    ) -> Result<usize, PushError<E>> {
        let Some(_in_flight) = self.lifecycle.enter() else {
            return Err(PushError::Permanent {
                dropped: batch.record_count(),
                source: ExportError::ShuttingDown,
            });
        };

        let pre_dropped = batch.pre_dropped();
        let events: Arc<[E]> = batch.into_events().into();
        let undelivered = |start: usize| pre_dropped + events.len() - start;

        let mut chunks =
            ChunkStream::spawn(Arc::clone(&events), self.max_content_length, cancel);
        // One engine serves every compressed chunk of this push, reset per chunk.
        let mut zipper = None;
        // First record not yet accepted by the endpoint.
        let mut delivered = 0;

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break Err(PushError::PartialLogs {
                        dropped: undelivered(delivered),
                        remainder: Batch::slice_from(&events[..], delivered),
                        source: ExportError::Cancelled,
                    });
                }
                next = chunks.next() => next,
            };
            let chunk = match next {
                None => break Ok(pre_dropped),
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    break Err(PushError::Permanent {
                        dropped: undelivered(e.start),
                        source: e.into(),
                    });
                }
            };
            if chunk.is_empty() {
                continue;
            }

            let bytes = chunk.body.len();
            let compressed = compression::should_compress(bytes, self.disable_compression);
            let body = if compressed {
                let zipper = zipper.get_or_insert_with(|| self.zippers.acquire());
                match zipper.compress(&chunk.body) {
                    Ok(body) => body,
                    Err(e) => {
                        break Err(PushError::Permanent {
                            dropped: undelivered(chunk.start),
                            source: e.into(),
                        });
                    }
                }
            } else {
                chunk.body
            };

            if let Err(source) = self.transport.send(cancel, body, compressed).await {
                let dropped = undelivered(chunk.start);
                break Err(if source.is_retryable() {
                    PushError::PartialLogs {
                        dropped,
                        remainder: Batch::slice_from(&events[..], chunk.start),
                        source,
                    }
                } else {
                    PushError::Permanent { dropped, source }
                });
            }
            delivered = chunk.start + chunk.records;
            trace!(
                chunk = chunk.index,
                records = chunk.records,
                bytes,
                compressed,
                "log chunk delivered"
            );
        };

        chunks.close().await;
        if result.is_ok() {
            debug!(records = events.len(), "pushed logs");
        }
        result
    }

    async fn push_events<E: EventRecord>(
        &self,
        cancel: &CancellationToken,
        batch: Batch<E>,
        kind: &'static str,
    ) -> Result<usize, PushError<E>> {
        let total = batch.record_count();
        let Some(_in_flight) = self.lifecycle.enter() else {
            return Err(PushError::Permanent {
                dropped: total,
                source: ExportError::ShuttingDown,
            });
        };
        if batch.is_empty() {
            return Ok(batch.pre_dropped());
        }

        let body = encode::encode_events(batch.events()).map_err(|e| PushError::Permanent {
            dropped: total,
            source: e.into(),
        })?;
        let (body, compressed) = self.wire_body(body).map_err(|source| PushError::Permanent {
            dropped: total,
            source,
        })?;
        self.transport
            .send(cancel, body, compressed)
            .await
            .map_err(|source| PushError::failed(total, source))?;

        debug!(kind, events = batch.len(), compressed, "pushed events");
        Ok(batch.pre_dropped())
    }

    /// Apply the compression decision to an encoded body.
    fn wire_body(&self, body: Vec<u8>) -> Result<(Bytes, bool), ExportError> {
        if compression::should_compress(body.len(), self.disable_compression) {
            let compressed = self.zippers.acquire().compress(&body)?;
            Ok((compressed, true))
        } else {
            Ok((Bytes::from(body), false))
        }
    }
}
