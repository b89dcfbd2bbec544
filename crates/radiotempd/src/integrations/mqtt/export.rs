//! Export layer over MQTT.
//!
//! Each service property is mirrored as a retained topic:
//! `{prefix}/{service}{path}` with payload `{"value": <json>}`.
//! Writes from other bus clients arrive on `{prefix}/W/{service}{path}`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tracing::debug;

use super::MqttClient;
use crate::engine::ExportError;
use crate::engine::Exporter;
use crate::engine::ServiceDescriptor;
use crate::engine::ServiceHandle;
use crate::engine::WriteRequest;

pub struct MqttExporter<C> {
    client: Arc<C>,
    prefix: String,
}

impl<C: MqttClient> MqttExporter<C> {
    pub fn new(client: Arc<C>, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn topic(&self, service_name: &str, path: &str) -> String {
        format!("{}/{}{}", self.prefix, service_name, path)
    }

    async fn publish_value(
        &self,
        service_name: &str,
        path: &str,
        value: &Value,
    ) -> Result<(), ExportError> {
        let topic = self.topic(service_name, path);
        let payload = serde_json::to_vec(&json!({ "value": value }))?;
        self.client
            .publish(&topic, &payload, true)
            .await
            .map_err(|e| ExportError::Publish {
                service: service_name.to_string(),
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl<C: MqttClient> Exporter for MqttExporter<C> {
    async fn register(&self, descriptor: &ServiceDescriptor) -> Result<ServiceHandle, ExportError> {
        for property in &descriptor.properties {
            self.publish_value(&descriptor.service_name, property.path, &property.initial)
                .await?;
        }
        debug!(
            "Published {} properties for {}",
            descriptor.properties.len(),
            descriptor.service_name
        );
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
        self.publish_value(&handle.service_name, path, &value).await
    }

    fn write_filter(&self) -> Option<String> {
        Some(format!("{}/W/#", self.prefix))
    }

    fn parse_write(&self, topic: &str, payload: &[u8]) -> Option<WriteRequest> {
        let rest = topic.strip_prefix(&self.prefix)?.strip_prefix("/W/")?;
        let slash = rest.find('/')?;
        let (service_name, path) = rest.split_at(slash);
        if service_name.is_empty() || path.len() < 2 {
            return None;
        }

        let value = match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(mut map)) if map.contains_key("value") => {
                map.remove("value").unwrap_or(Value::Null)
            }
            Ok(other) => other,
            Err(_) => Value::String(String::from_utf8_lossy(payload).into_owned()),
        };

        Some(WriteRequest {
            service_name: service_name.to_string(),
            path: path.to_string(),
            value,
        })
    }
}
