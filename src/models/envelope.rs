use serde::Deserialize;

/// ---- Wire schema (oneM2M notifications on MQTT) ----
///
/// Sensors publish oneM2M request primitives. The interesting parts are the
/// addressing path (`m2m:rqp.to`, carries the sensor name as a positional
/// segment) and the content instance (`m2m:rqp.pc.m2m:cin.con`, a separately
/// JSON-encoded telemetry payload).
///
/// Every field is defaulted: a *missing* key degrades to the sentinel/None
/// behavior downstream, only *malformed* JSON is a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OneM2mEnvelope {
    #[serde(rename = "m2m:rqp")]
    pub request: RequestPrimitive,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestPrimitive {
    /// Addressing path, e.g. `/cse-1/cb/dht22-kitchen/data`.
    pub to: String,
    pub pc: PrimitiveContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrimitiveContent {
    #[serde(rename = "m2m:cin")]
    pub content_instance: ContentInstance,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentInstance {
    /// The embedded telemetry payload, itself a JSON document in a string.
    pub con: Option<String>,
}

/// The inner `con` payload. Sensors omit fields they do not measure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SensorPayload {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}
