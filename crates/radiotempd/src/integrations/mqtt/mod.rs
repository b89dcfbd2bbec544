mod client;
mod config;
mod export;

pub use client::MqttClient;
#[cfg(test)]
pub use client::MockMqttClient;
pub use client::RumqttcClient;
pub use config::Config as MqttConfig;
pub use export::MqttExporter;
