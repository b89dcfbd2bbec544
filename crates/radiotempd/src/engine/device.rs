use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;
use strum::FromRepr;

/// Category of a temperature device, as understood by the monitoring bus.
///
/// The discriminant is the value published as `/TemperatureType`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[repr(u8)]
pub enum DeviceType {
    Battery = 0,
    Fridge = 1,
    Generic = 2,
    Room = 3,
    Outdoor = 4,
    WaterHeater = 5,
    Freezer = 6,
}

impl DeviceType {
    /// Numeric value published on the bus.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Accepts either the snake_case name (`"outdoor"`) or the bus code (`4`).
impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct NameOrCode;

        impl de::Visitor<'_> for NameOrCode {
            type Value = DeviceType;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a device type name or a code between 0 and 6")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse()
                    .map_err(|_| E::custom(format!("unknown device type '{}'", v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                u8::try_from(v)
                    .ok()
                    .and_then(DeviceType::from_repr)
                    .ok_or_else(|| E::custom(format!("unknown device type code {}", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("unknown device type code {}", v)))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(NameOrCode)
    }
}

/// Deserialize a channel that can be either a string or an integer.
///
/// rtl_433 reports `channel` as an integer for most models but as a letter
/// (`"A"`, `"B"`) for some, so both are normalized to a string.
pub(crate) fn deserialize_channel<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrInt;

    impl de::Visitor<'_> for StringOrInt {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("string or integer")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(StringOrInt)
}

/// Build the registry key for a model/channel pair.
pub fn device_key(model: &str, channel: &str) -> String {
    format!("{}_{}", model, channel)
}

/// Where a device's readings come from.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKind {
    /// A physical sensor decoded by rtl_433.
    Radio {
        topic: String,
        temperature_field: String,
    },
    /// A virtual device fed from a weather API.
    Online,
    /// The outdoor average.
    Aggregate,
}

/// In-memory state for one physical or virtual temperature sensor.
///
/// Identity (model, channel, type, kind) is fixed at construction; the display
/// name and readings are updated in place for the life of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub name: String,
    model: String,
    channel: String,
    device_type: DeviceType,
    kind: DeviceKind,

    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,

    /// Time of the last successful weather fetch (online devices only)
    pub last_update: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    pub fn radio(
        name: impl Into<String>,
        model: impl Into<String>,
        channel: impl Into<String>,
        topic: impl Into<String>,
        temperature_field: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self::with_kind(
            name.into(),
            model.into(),
            channel.into(),
            device_type,
            DeviceKind::Radio {
                topic: topic.into(),
                temperature_field: temperature_field.into(),
            },
        )
    }

    /// The weather-backed device. Its model is the provider name.
    pub fn online(provider: impl Into<String>) -> Self {
        Self::with_kind(
            "online".to_string(),
            provider.into(),
            "1".to_string(),
            DeviceType::Outdoor,
            DeviceKind::Online,
        )
    }

    pub fn aggregate() -> Self {
        Self::with_kind(
            "Outdoor".to_string(),
            "aggregate".to_string(),
            "1".to_string(),
            DeviceType::Outdoor,
            DeviceKind::Aggregate,
        )
    }

    fn with_kind(
        name: String,
        model: String,
        channel: String,
        device_type: DeviceType,
        kind: DeviceKind,
    ) -> Self {
        Self {
            name,
            model,
            channel,
            device_type,
            kind,
            temperature: None,
            humidity: None,
            pressure: None,
            last_update: None,
        }
    }

    pub fn key(&self) -> String {
        device_key(&self.model, &self.channel)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn is_online(&self) -> bool {
        matches!(self.kind, DeviceKind::Online)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, DeviceKind::Aggregate)
    }

    /// Topic this device's RF readings arrive on, if it has one.
    pub fn topic(&self) -> Option<&str> {
        match &self.kind {
            DeviceKind::Radio { topic, .. } => Some(topic),
            _ => None,
        }
    }

    pub fn temperature_field(&self) -> Option<&str> {
        match &self.kind {
            DeviceKind::Radio {
                temperature_field, ..
            } => Some(temperature_field),
            _ => None,
        }
    }

    /// Name with everything outside `[A-Za-z0-9]` replaced by `_`.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_model_and_channel() {
        let record = DeviceRecord::radio(
            "Fridge",
            "Nexus-TH",
            "3",
            "rtl_433/events",
            "temperature_C",
            DeviceType::Fridge,
        );
        assert_eq!(record.key(), "Nexus-TH_3");
        assert_eq!(record.topic(), Some("rtl_433/events"));
        assert_eq!(record.temperature_field(), Some("temperature_C"));
        assert!(!record.is_online());
        assert!(!record.is_aggregate());
    }

    #[test]
    fn test_synthetic_records() {
        let online = DeviceRecord::online("openweather");
        assert_eq!(online.key(), "openweather_1");
        assert!(online.is_online());
        assert_eq!(online.topic(), None);
        assert_eq!(online.device_type(), DeviceType::Outdoor);

        let aggregate = DeviceRecord::aggregate();
        assert_eq!(aggregate.key(), "aggregate_1");
        assert_eq!(aggregate.name, "Outdoor");
        assert!(aggregate.is_aggregate());
        assert_eq!(aggregate.temperature_field(), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Living Room"), "Living_Room");
        assert_eq!(normalize_name("Bätt-1"), "B_tt_1");
        assert_eq!(normalize_name("abc123"), "abc123");
    }

    #[test]
    fn test_device_type_codes() {
        assert_eq!(DeviceType::Battery.code(), 0);
        assert_eq!(DeviceType::Outdoor.code(), 4);
        assert_eq!(DeviceType::Freezer.code(), 6);
        assert_eq!(DeviceType::WaterHeater.to_string(), "water_heater");
    }

    #[derive(Deserialize)]
    struct Wrapper {
        device_type: DeviceType,
        #[serde(deserialize_with = "deserialize_channel")]
        channel: String,
    }

    #[test]
    fn test_deserialize_name_and_code() {
        let w: Wrapper =
            serde_json::from_str(r#"{"device_type": "water_heater", "channel": 2}"#).unwrap();
        assert_eq!(w.device_type, DeviceType::WaterHeater);
        assert_eq!(w.channel, "2");

        let w: Wrapper = serde_json::from_str(r#"{"device_type": 4, "channel": "A"}"#).unwrap();
        assert_eq!(w.device_type, DeviceType::Outdoor);
        assert_eq!(w.channel, "A");

        let w: Wrapper =
            serde_json::from_str(r#"{"device_type": "Fridge", "channel": "1"}"#).unwrap();
        assert_eq!(w.device_type, DeviceType::Fridge);
    }

    #[test]
    fn test_deserialize_unknown_device_type() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"device_type": 7, "channel": 1}"#).is_err());
        assert!(
            serde_json::from_str::<Wrapper>(r#"{"device_type": "sauna", "channel": 1}"#).is_err()
        );
    }
}
