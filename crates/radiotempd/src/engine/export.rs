//! Export layer seam.
//!
//! Every device is published as a `com.victronenergy.temperature.*` service
//! with a fixed set of management properties and a handful of mutable
//! readings. The engine only talks to the [`Exporter`] trait; the transport
//! lives in `integrations`.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use super::device::DeviceRecord;

/// Property paths on an exported temperature service.
pub mod paths {
    pub const PROCESS_NAME: &str = "/Mgmt/ProcessName";
    pub const PROCESS_VERSION: &str = "/Mgmt/ProcessVersion";
    pub const CONNECTION: &str = "/Mgmt/Connection";
    pub const DEVICE_INSTANCE: &str = "/DeviceInstance";
    pub const PRODUCT_NAME: &str = "/ProductName";
    pub const DEVICE_NAME: &str = "/DeviceName";
    pub const FIRMWARE_VERSION: &str = "/FirmwareVersion";
    pub const HARDWARE_VERSION: &str = "/HardwareVersion";
    pub const CONNECTED: &str = "/Connected";
    pub const SERIAL: &str = "/Serial";

    pub const TEMPERATURE: &str = "/Temperature";
    pub const HUMIDITY: &str = "/Humidity";
    pub const PRESSURE: &str = "/Pressure";
    pub const STATUS: &str = "/Status";
    pub const TEMPERATURE_TYPE: &str = "/TemperatureType";
    pub const CUSTOM_NAME: &str = "/CustomName";
    pub const UPDATE_INDEX: &str = "/UpdateIndex";
}

const SERVICE_PREFIX: &str = "com.victronenergy.temperature";
const CONNECTION_LABEL: &str = "MQTT";
const FIRMWARE_VERSION: u32 = 0x0136;
const HARDWARE_VERSION: u32 = 8;
const SERIAL_PLACEHOLDER: &str = "xxxx";

/// Identifies a registered service on the export layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    pub service_name: String,
    pub instance: u32,
}

/// One property of a service, with its value at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub path: &'static str,
    pub initial: Value,
    pub writeable: bool,
}

/// Everything the export layer needs to register a device.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub instance: u32,
    pub properties: Vec<Property>,
}

impl ServiceDescriptor {
    pub fn for_device(record: &DeviceRecord, instance: u32) -> Self {
        let name = record.normalized_name();
        let fixed = |path, initial| Property {
            path,
            initial,
            writeable: false,
        };
        let mutable = |path, initial| Property {
            path,
            initial,
            writeable: true,
        };

        Self {
            service_name: format!("{}.{}", SERVICE_PREFIX, name),
            instance,
            properties: vec![
                fixed(paths::PROCESS_NAME, json!(env!("CARGO_PKG_NAME"))),
                fixed(paths::PROCESS_VERSION, json!(env!("CARGO_PKG_VERSION"))),
                fixed(paths::CONNECTION, json!(CONNECTION_LABEL)),
                fixed(paths::DEVICE_INSTANCE, json!(instance)),
                fixed(paths::PRODUCT_NAME, json!(record.name)),
                fixed(paths::DEVICE_NAME, json!(record.name)),
                fixed(paths::FIRMWARE_VERSION, json!(FIRMWARE_VERSION)),
                fixed(paths::HARDWARE_VERSION, json!(HARDWARE_VERSION)),
                fixed(paths::CONNECTED, json!(1)),
                fixed(paths::SERIAL, json!(SERIAL_PLACEHOLDER)),
                mutable(paths::TEMPERATURE, json!(0)),
                mutable(paths::HUMIDITY, json!(0)),
                mutable(paths::PRESSURE, Value::Null),
                mutable(paths::STATUS, json!(0)),
                mutable(paths::TEMPERATURE_TYPE, json!(record.device_type().code())),
                mutable(paths::CUSTOM_NAME, json!(name)),
                mutable(paths::UPDATE_INDEX, json!(0)),
            ],
        }
    }

    pub fn is_writeable(&self, path: &str) -> bool {
        self.properties
            .iter()
            .any(|p| p.writeable && p.path == path)
    }
}

/// A write coming from outside the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub service_name: String,
    pub path: String,
    pub value: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to publish {path} for {service}: {reason}")]
    Publish {
        service: String,
        path: String,
        reason: String,
    },

    #[error("Failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Transport for the monitoring-bus export layer.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Register a service and publish its initial property values.
    async fn register(&self, descriptor: &ServiceDescriptor) -> Result<ServiceHandle, ExportError>;

    /// Push a new value for one property.
    async fn set(&self, handle: &ServiceHandle, path: &str, value: Value)
        -> Result<(), ExportError>;

    /// Topic filter on which external writes arrive, if writes are supported.
    fn write_filter(&self) -> Option<String>;

    /// Decode an inbound bus message as an external write.
    fn parse_write(&self, topic: &str, payload: &[u8]) -> Option<WriteRequest>;
}

/// Exporter that records everything, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingExporter {
    pub registered: std::sync::Mutex<Vec<ServiceDescriptor>>,
    pub values: std::sync::Mutex<Vec<(String, String, Value)>>,

    /// Paths whose `set` fails
    pub failing_paths: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values pushed for one service/path, oldest first.
    pub fn values_for(&self, service_name: &str, path: &str) -> Vec<Value> {
        self.values
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, p, _)| s == service_name && p == path)
            .map(|(_, _, v)| v.clone())
            .collect()
    }

    pub fn last_value(&self, service_name: &str, path: &str) -> Option<Value> {
        self.values_for(service_name, path).pop()
    }
}

#[cfg(test)]
#[async_trait]
impl Exporter for RecordingExporter {
    async fn register(&self, descriptor: &ServiceDescriptor) -> Result<ServiceHandle, ExportError> {
        self.registered.lock().unwrap().push(descriptor.clone());
        Ok(ServiceHandle {
            service_name: descriptor.service_name.clone(),
            instance: descriptor.instance,
        })
    }

    async fn set(
        &self,
        handle: &ServiceHandle,
        path: &str,
        value: Value,
    ) -> Result<(), ExportError> {
        if self.failing_paths.lock().unwrap().iter().any(|p| p == path) {
            return Err(ExportError::Publish {
                service: handle.service_name.clone(),
                path: path.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        self.values
            .lock()
            .unwrap()
            .push((handle.service_name.clone(), path.to_string(), value));
        Ok(())
    }

    fn write_filter(&self) -> Option<String> {
        Some("test/W/#".to_string())
    }

    fn parse_write(&self, topic: &str, payload: &[u8]) -> Option<WriteRequest> {
        let rest = topic.strip_prefix("test/W/")?;
        let slash = rest.find('/')?;
        Some(WriteRequest {
            service_name: rest[..slash].to_string(),
            path: rest[slash..].to_string(),
            value: serde_json::from_slice(payload).unwrap_or(Value::Null),
        })
    }
}
