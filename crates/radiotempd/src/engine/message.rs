//! Messages delivered to the engine task.
//!
//! - `BusMessage`: a publish received from the MQTT broker
//! - `WeatherOutcome`: the result of a weather fetch running on its own task

use super::weather::Conditions;
use super::weather::WeatherError;

/// A message received on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }
}

/// Result of a weather fetch for one online device.
#[derive(Debug)]
pub struct WeatherOutcome {
    pub key: String,
    pub result: Result<Conditions, WeatherError>,
}
