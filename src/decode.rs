use crate::models::envelope::{OneM2mEnvelope, SensorPayload};
use crate::models::reading::{SensorReading, UNKNOWN_SENSOR};

/// Positional segment of the oneM2M addressing path that carries the
/// sensor name, e.g. `/cse-1/cb/dht22-kitchen/data` splits into
/// `["", "cse-1", "cb", "dht22-kitchen", "data"]` -> index 3.
const SENSOR_NAME_SEGMENT: usize = 3;

/// A message that could not be normalized. Carries the offending raw text
/// so the drop can be diagnosed from logs alone.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not utf-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("malformed oneM2M envelope ({source}): {raw}")]
    Envelope {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed sensor payload ({source}): {raw}")]
    Payload {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Normalizes one raw MQTT payload into a [`SensorReading`].
///
/// Missing keys inside a well-formed envelope degrade (`sensor_name` falls
/// back to [`UNKNOWN_SENSOR`], absent measurements become `None`); only
/// structurally malformed JSON is an error. Pure apart from reading the
/// clock for the timestamp stamp.
pub fn decode(payload: &[u8]) -> Result<SensorReading, DecodeError> {
    let text = std::str::from_utf8(payload)?;

    let envelope: OneM2mEnvelope =
        serde_json::from_str(text).map_err(|source| DecodeError::Envelope {
            raw: text.to_string(),
            source,
        })?;
    let request = envelope.request;

    let sensor_name = request
        .to
        .split('/')
        .nth(SENSOR_NAME_SEGMENT)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_SENSOR.to_string());

    let data: SensorPayload = match request.pc.content_instance.con {
        Some(con) => serde_json::from_str(&con).map_err(|source| DecodeError::Payload {
            raw: con.clone(),
            source,
        })?,
        None => SensorPayload::default(),
    };

    Ok(SensorReading::new(sensor_name, data.temperature, data.humidity))
}
