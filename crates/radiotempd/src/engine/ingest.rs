//! Sensor reading ingestion.
//!
//! rtl_433 publishes one JSON object per decoded radio packet, e.g.:
//! `{"model": "Nexus-TH", "channel": 1, "temperature_C": 21.5, "humidity": 55}`
//!
//! The model/channel pair selects the device; the device's configured
//! temperature field selects which key carries the temperature.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use super::device::deserialize_channel;
use super::device::device_key;
use super::registry::Registry;

#[derive(Debug, Deserialize)]
struct SensorPayload {
    model: String,
    #[serde(deserialize_with = "deserialize_channel")]
    channel: String,
    humidity: Option<f64>,
    #[serde(rename = "pressure_hPa")]
    pressure: Option<f64>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The reading was written to the device with this key.
    Applied { key: String },
    /// The topic is not one the bridge subscribed to for sensor readings.
    UnknownTopic,
    /// The payload names a model/channel with no registered radio device.
    UnknownDevice { key: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload for {key} is missing field '{field}'")]
    MissingField { key: String, field: String },

    #[error("Field '{field}' for {key} is not a number")]
    NotANumber { key: String, field: String },
}

/// Applies rtl_433 readings to the registry.
#[derive(Debug, Default)]
pub struct Ingestor {
    topics: BTreeSet<String>,
}

impl Ingestor {
    /// Collect the topic set from every radio device in the registry.
    pub fn from_registry(registry: &Registry) -> Self {
        let topics = registry
            .entries()
            .filter_map(|e| e.record.topic())
            .map(str::to_string)
            .collect();
        Self { topics }
    }

    pub fn owns(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    /// Parse a payload and overwrite the matching device's readings.
    ///
    /// Only the resolved device is touched. Nothing is published here; the
    /// next tick pushes the new values.
    pub fn handle(
        &self,
        registry: &mut Registry,
        topic: &str,
        payload: &[u8],
    ) -> Result<IngestOutcome, IngestError> {
        if !self.owns(topic) {
            return Ok(IngestOutcome::UnknownTopic);
        }

        let payload: SensorPayload = serde_json::from_slice(payload)?;
        let key = device_key(&payload.model, &payload.channel);

        let record = match registry.get_mut(&key) {
            Ok(record) => record,
            Err(_) => return Ok(IngestOutcome::UnknownDevice { key }),
        };
        let Some(field) = record.temperature_field() else {
            // Online and aggregate devices never take radio readings.
            return Ok(IngestOutcome::UnknownDevice { key });
        };

        let temperature = match payload.fields.get(field) {
            None | Some(Value::Null) => {
                return Err(IngestError::MissingField {
                    key,
                    field: field.to_string(),
                });
            }
            Some(value) => value.as_f64().ok_or_else(|| IngestError::NotANumber {
                key: key.clone(),
                field: field.to_string(),
            })?,
        };
        let humidity = payload.humidity.ok_or_else(|| IngestError::MissingField {
            key: key.clone(),
            field: "humidity".to_string(),
        })?;

        record.temperature = Some(temperature);
        record.humidity = Some(humidity);
        if let Some(pressure) = payload.pressure {
            record.pressure = Some(pressure);
        }

        debug!(
            "Reading for {}: temperature={}, humidity={}, pressure={:?}",
            key, temperature, humidity, payload.pressure
        );

        Ok(IngestOutcome::Applied { key })
    }
}
