//! Sensor catalog
//!
//! Validates measurement payloads against the configured sensor types and
//! hands out measurement ids.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{MeasurementValidator, SensorType, ValidatedMeasurement, ValidationError};

/// Known sensor types, keyed by id
#[derive(Debug)]
pub struct SensorCatalog {
    sensors: HashMap<u64, SensorType>,
    next_id: AtomicU64,
}

impl SensorCatalog {
    pub fn new(sensors: impl IntoIterator<Item = SensorType>) -> Self {
        Self {
            sensors: sensors.into_iter().map(|s| (s.id, s)).collect(),
            next_id: AtomicU64::new(1),
        }
    }

    fn parse(&self, payload: &Value) -> Result<(u64, DateTime<Utc>, f64), ValidationError> {
        let fields = payload.as_object().ok_or(ValidationError::NotAnObject)?;

        let sensor_type = fields
            .get("sensor_type")
            .ok_or(ValidationError::MissingField("sensor_type"))?
            .as_u64()
            .ok_or_else(|| ValidationError::InvalidField {
                field: "sensor_type",
                reason: "expected a sensor type id".to_string(),
            })?;

        let date_time = fields
            .get("date_time")
            .ok_or(ValidationError::MissingField("date_time"))?
            .as_str()
            .ok_or_else(|| ValidationError::InvalidField {
                field: "date_time",
                reason: "expected an RFC 3339 timestamp".to_string(),
            })?;
        let date_time = DateTime::parse_from_rfc3339(date_time)
            .map_err(|e| ValidationError::InvalidField {
                field: "date_time",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        let value = fields
            .get("value")
            .ok_or(ValidationError::MissingField("value"))?
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValidationError::InvalidField {
                field: "value",
                reason: "expected a finite number".to_string(),
            })?;

        Ok((sensor_type, date_time, value))
    }
}

#[async_trait]
impl MeasurementValidator for SensorCatalog {
    async fn validate_measurement(
        &self,
        kit: &str,
        payload: &Value,
    ) -> Result<ValidatedMeasurement, ValidationError> {
        let (sensor_type, date_time, value) = self.parse(payload)?;

        let sensor = self
            .sensors
            .get(&sensor_type)
            .ok_or(ValidationError::UnknownSensorType(sensor_type))?;
        if !sensor.accepts(value) {
            return Err(ValidationError::OutOfRange { sensor_type, value });
        }

        Ok(ValidatedMeasurement {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kit: kit.to_string(),
            sensor_type,
            date_time,
            value,
        })
    }
}
