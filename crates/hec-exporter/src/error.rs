use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::chunker::ChunkError;
use crate::encode::EncodeError;
use crate::event::{Batch, HecEvent};

/// Why a single body failed to reach the HEC endpoint.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("failed to build HEC request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("HEC request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("HTTP {} {:?}", .status.as_u16(), .status.canonical_reason().unwrap_or_default())]
    Status { status: StatusCode },

    #[error("push cancelled before the HEC request completed")]
    Cancelled,

    #[error("exporter is shutting down")]
    ShuttingDown,
}

impl ExportError {
    /// Transient failures a caller may retry: the network, a non-2xx
    /// response, or cancellation. Everything else is a data or programming
    /// defect that will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::Network(_) | ExportError::Status { .. } | ExportError::Cancelled
        )
    }
}

impl From<ChunkError> for ExportError {
    fn from(err: ChunkError) -> Self {
        ExportError::Encode(err.source)
    }
}

/// Outcome of a failed push. `dropped` always counts every record of the
/// original batch that did not reach the endpoint, converter drops included.
#[derive(Debug, Error)]
pub enum PushError<E: fmt::Debug = HecEvent> {
    /// Retrying will not help.
    #[error("{dropped} records dropped permanently: {source}")]
    Permanent {
        dropped: usize,
        #[source]
        source: ExportError,
    },

    /// Nothing from the batch was delivered; the whole batch may be retried.
    #[error("{dropped} records not delivered: {source}")]
    Transport {
        dropped: usize,
        #[source]
        source: ExportError,
    },

    /// Log delivery stopped part-way. Earlier chunks, if any, were accepted;
    /// only `remainder` may be retried.
    #[error("{dropped} log records not delivered: {source}")]
    PartialLogs {
        dropped: usize,
        remainder: Batch<E>,
        #[source]
        source: ExportError,
    },
}

impl<E: fmt::Debug> PushError<E> {
    /// Classify `source` as permanent or transport by its retryability.
    pub(crate) fn failed(dropped: usize, source: ExportError) -> Self {
        if source.is_retryable() {
            PushError::Transport { dropped, source }
        } else {
            PushError::Permanent { dropped, source }
        }
    }

    pub fn dropped(&self) -> usize {
        match self {
            PushError::Permanent { dropped, .. }
            | PushError::Transport { dropped, .. }
            | PushError::PartialLogs { dropped, .. } => *dropped,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, PushError::Permanent { .. })
    }

    pub fn export_error(&self) -> &ExportError {
        match self {
            PushError::Permanent { source, .. }
            | PushError::Transport { source, .. }
            | PushError::PartialLogs { source, .. } => source,
        }
    }

    /// The undelivered log records, for partial failures only.
    pub fn remainder(&self) -> Option<&Batch<E>> {
        match self {
            PushError::PartialLogs { remainder, .. } => Some(remainder),
            _ => None,
        }
    }

    pub fn into_remainder(self) -> Option<Batch<E>> {
        match self {
            PushError::PartialLogs { remainder, .. } => Some(remainder),
            _ => None,
        }
    }
}
