//! Measurements
//!
//! Types for sensor readings published by kits, and the validation seam
//! the publish handler relies on before anything is broadcast.

mod catalog;

pub use catalog::SensorCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::auth::KitId;

/// Reasons a measurement payload is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Measurement must be a JSON object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(u64),

    #[error("Value {value} out of range for sensor type {sensor_type}")]
    OutOfRange { sensor_type: u64, value: f64 },
}

/// A kind of sensor a kit may report on
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorType {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub unit: String,
    /// Lowest accepted value (inclusive)
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Highest accepted value (inclusive)
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl SensorType {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            brand: String::new(),
            kind: String::new(),
            unit: String::new(),
            min_value: None,
            max_value: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn accepts(&self, value: f64) -> bool {
        self.min_value.map_or(true, |min| value >= min)
            && self.max_value.map_or(true, |max| value <= max)
    }
}

/// A measurement accepted for a kit, as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedMeasurement {
    pub id: u64,
    #[serde(skip)]
    pub kit: KitId,
    pub sensor_type: u64,
    pub date_time: DateTime<Utc>,
    pub value: f64,
}

/// Validates and accepts inbound measurement payloads
#[async_trait]
pub trait MeasurementValidator: Send + Sync {
    async fn validate_measurement(
        &self,
        kit: &str,
        payload: &Value,
    ) -> Result<ValidatedMeasurement, ValidationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sensor_range() {
        let sensor = SensorType::new(1, "temperature").range(-40.0, 85.0);
        assert!(sensor.accepts(21.5));
        assert!(sensor.accepts(85.0));
        assert!(!sensor.accepts(120.0));

        let unbounded = SensorType::new(2, "co2");
        assert!(unbounded.accepts(f64::MAX));
    }

    #[test]
    fn test_serialize_measurement_omits_kit() {
        let measurement = ValidatedMeasurement {
            id: 7,
            kit: "kit42".to_string(),
            sensor_type: 1,
            date_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            value: 21.5,
        };

        let json = serde_json::to_value(&measurement).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "sensor_type": 1,
                "date_time": "2024-03-01T12:00:00Z",
                "value": 21.5
            })
        );
    }

    #[test]
    fn test_deserialize_sensor_type() {
        let sensor: SensorType = toml::from_str(
            r#"
            id = 3
            name = "Air temperature"
            brand = "Bosch"
            type = "BME280"
            unit = "Degrees Celsius"
            min_value = -40.0
            "#,
        )
        .unwrap();
        assert_eq!(sensor.kind, "BME280");
        assert_eq!(sensor.min_value, Some(-40.0));
        assert_eq!(sensor.max_value, None);
    }
}
