use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Written after every JSON object in a HEC body.
pub const EVENT_SEPARATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error)]
#[error("failed to encode event {index}: {source}")]
pub struct EncodeError {
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Encode `events` in order as one HEC body.
///
/// Stops at the first record that fails to serialize; nothing of the partial
/// body escapes on error.
pub fn encode_events<E: Serialize>(events: &[E]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    for (index, event) in events.iter().enumerate() {
        append_event(&mut buf, event).map_err(|source| EncodeError { index, source })?;
    }
    Ok(buf)
}

/// Append one event and its separator to `buf`.
///
/// On error `buf` is truncated back to its previous length.
pub fn append_event<E: Serialize>(buf: &mut Vec<u8>, event: &E) -> Result<(), serde_json::Error> {
    let mark = buf.len();
    if let Err(e) = serde_json::to_writer(&mut *buf, event) {
        buf.truncate(mark);
        return Err(e);
    }
    buf.extend_from_slice(EVENT_SEPARATOR);
    Ok(())
}

/// Parse an uncompressed HEC body back into its records.
///
/// The separator is JSON whitespace, so the body is a plain stream of values.
pub fn decode_events<E: DeserializeOwned>(body: &[u8]) -> Result<Vec<E>, serde_json::Error> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<E>()
        .collect()
}
