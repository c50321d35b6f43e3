//! Delivery engine for a Splunk HTTP Event Collector (HEC) exporter.
//!
//! Batches of already-converted events are encoded as concatenated JSON
//! objects, gzip-compressed when larger than one Ethernet frame, and POSTed to
//! the collector. Logs are streamed in size-bounded chunks so that a failure
//! part-way through reports exactly the records that still need delivering.

pub mod chunker;
pub mod client;
pub mod compression;
pub mod config;
pub mod encode;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod transport;

pub use client::HecClient;
pub use config::{Config, ConfigError};
pub use error::{ExportError, PushError};
pub use event::{Batch, Convert, EventRecord, HecEvent};
pub use lifecycle::LifecycleState;
pub use transport::BuildError;
