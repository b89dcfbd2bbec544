use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use super::device::DeviceKind;
use super::device::DeviceType;
use super::registry::Entry;

/// Where a device's readings come from, as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Radio,
    Online,
    Aggregate,
}

/// Read-only view of one device, published after every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub key: String,
    pub name: String,
    pub model: String,
    pub channel: String,
    pub device_type: DeviceType,
    pub kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub service_name: String,
    pub instance: u32,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub update_index: u8,
}

impl From<&Entry> for DeviceSnapshot {
    fn from(entry: &Entry) -> Self {
        let record = &entry.record;
        let kind = match record.kind() {
            DeviceKind::Radio { .. } => SourceKind::Radio,
            DeviceKind::Online => SourceKind::Online,
            DeviceKind::Aggregate => SourceKind::Aggregate,
        };
        Self {
            key: record.key(),
            name: record.name.clone(),
            model: record.model().to_string(),
            channel: record.channel().to_string(),
            device_type: record.device_type(),
            kind,
            topic: record.topic().map(str::to_string),
            service_name: entry.handle.service_name.clone(),
            instance: entry.handle.instance,
            temperature: record.temperature,
            humidity: record.humidity,
            pressure: record.pressure,
            last_update: record.last_update,
            update_index: entry.update_index(),
        }
    }
}

/// Snapshot of every device, in registration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub devices: Vec<DeviceSnapshot>,
}

impl State {
    pub fn device(&self, key: &str) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.key == key)
    }
}
