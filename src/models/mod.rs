pub mod envelope;
pub mod reading;

pub use envelope::{OneM2mEnvelope, SensorPayload};
pub use reading::{SensorReading, UNKNOWN_SENSOR};
