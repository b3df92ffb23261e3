use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sensor name used when the addressing path does not carry one.
pub const UNKNOWN_SENSOR: &str = "unknown";

/// One normalized sensor observation.
///
/// Wire and column names keep the legacy abbreviations (`sensor_nm`,
/// `create_dt`) so the existing portal keeps working against both the REST
/// and the WebSocket surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Generated as `{sensor_name}_{create_dt:%Y%m%d%H%M%S}`. Two readings
    /// from the same sensor within one second collide; that is accepted and
    /// not deduplicated, so the column carries no uniqueness constraint.
    pub sensor_id: String,

    #[serde(rename = "sensor_nm")]
    pub sensor_name: String,

    pub temperature: Option<f64>,
    pub humidity: Option<f64>,

    #[serde(rename = "create_dt")]
    pub created_at: DateTime<Utc>,
}

impl SensorReading {
    /// Builds a reading, stamping `created_at` and deriving `sensor_id`.
    pub fn new(sensor_name: impl Into<String>, temperature: Option<f64>, humidity: Option<f64>) -> Self {
        Self::with_timestamp(sensor_name, temperature, humidity, Utc::now())
    }

    pub fn with_timestamp(
        sensor_name: impl Into<String>,
        temperature: Option<f64>,
        humidity: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let sensor_name = sensor_name.into();
        let sensor_id = format!("{}_{}", sensor_name, created_at.format("%Y%m%d%H%M%S"));

        Self {
            sensor_id,
            sensor_name,
            temperature,
            humidity,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sensor_id_derives_from_name_and_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 11, 10, 30, 5).unwrap();
        let r = SensorReading::with_timestamp("dht22-kitchen", Some(21.5), None, ts);

        assert_eq!(r.sensor_id, "dht22-kitchen_20260111103005");
        assert_eq!(r.sensor_name, "dht22-kitchen");
    }

    #[test]
    fn wire_names_keep_legacy_abbreviations() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 11, 10, 30, 5).unwrap();
        let r = SensorReading::with_timestamp("s1", Some(20.0), Some(40.0), ts);

        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(v["sensor_nm"], "s1");
        assert!(v.get("create_dt").is_some());
        assert!(v.get("sensor_name").is_none());
        assert!(v.get("created_at").is_none());
    }

    #[test]
    fn absent_measurements_serialize_as_null() {
        let r = SensorReading::new("s1", None, Some(40.0));
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();

        assert!(v["temperature"].is_null());
        assert_eq!(v["humidity"], 40.0);
    }
}
