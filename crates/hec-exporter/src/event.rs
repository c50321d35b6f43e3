use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bounds every record type pushed through the client must satisfy.
pub trait EventRecord: Serialize + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> EventRecord for T where T: Serialize + Clone + fmt::Debug + Send + Sync + 'static {}

/// One event as accepted by the HEC `/services/collector` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HecEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub event: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl HecEvent {
    pub fn new(event: impl Into<Value>) -> Self {
        Self {
            time: None,
            host: None,
            source: None,
            sourcetype: None,
            index: None,
            event: event.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Turns upstream telemetry into wire-level event records.
///
/// Returns the converted events in order, plus the number of input records
/// that could not be represented and were dropped before handoff.
pub trait Convert<T: ?Sized> {
    type Event;

    fn convert(&self, input: &T) -> (Vec<Self::Event>, usize);
}

/// Ordered events for a single push, plus the records the converter already dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<E = HecEvent> {
    events: Vec<E>,
    pre_dropped: usize,
}

impl<E> Batch<E> {
    pub fn new(events: Vec<E>) -> Self {
        Self::with_pre_dropped(events, 0)
    }

    pub fn with_pre_dropped(events: Vec<E>, pre_dropped: usize) -> Self {
        Self {
            events,
            pre_dropped,
        }
    }

    pub fn convert<T, C>(converter: &C, input: &T) -> Self
    where
        T: ?Sized,
        C: Convert<T, Event = E>,
    {
        let (events, pre_dropped) = converter.convert(input);
        Self::with_pre_dropped(events, pre_dropped)
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn into_events(self) -> Vec<E> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pre_dropped(&self) -> usize {
        self.pre_dropped
    }

    /// Events plus pre-dropped records: the size of the original upstream batch.
    pub fn record_count(&self) -> usize {
        self.events.len() + self.pre_dropped
    }
}

impl<E: Clone> Batch<E> {
    /// The events from `start` onward as a new batch with no pre-dropped records.
    pub fn slice_from(events: &[E], start: usize) -> Self {
        Self::new(events.get(start..).unwrap_or_default().to_vec())
    }
}
