use std::error::Error;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::ConnectionError;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::MqttConfig;
use crate::engine::BusMessage;

/// How long to wait for the broker's CONNACK before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_SIZE: usize = 64;

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    ///
    /// Returns the stream of messages received on subscribed topics.
    async fn connect(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<BusMessage>, Box<dyn Error + Send>>;

    /// Subscribe to an MQTT topic filter
    async fn subscribe(&self, topic: &str) -> Result<(), Box<dyn Error + Send>>;

    /// Publish a message to an MQTT topic
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>>;
}

fn not_connected() -> Box<dyn Error + Send> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "MQTT client not connected. Call connect() first.",
    ))
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub subscriptions: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, Vec<u8>, bool)>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<BusMessage>>>,
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message as if it came from the broker
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            tx.send(BusMessage::new(topic, payload)).unwrap();
        }
    }

    /// Payloads published to one topic, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, p, _)| serde_json::from_slice(p).unwrap())
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<BusMessage>, Box<dyn Error + Send>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        if self.inbound.lock().unwrap().is_none() {
            return Err(not_connected());
        }
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Topic filters to restore after a reconnect
    subscriptions: Arc<Mutex<Vec<String>>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let Some(username) = &config.username {
            let password = config.password.clone().unwrap_or_default();
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            event_loop_task: None,
        }
    }
}

/// Poll until the broker acknowledges the connection.
async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = event_loop.poll().await? {
            debug!("CONNACK: {:?}", ack.code);
            return Ok(());
        }
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<BusMessage>, Box<dyn Error + Send>> {
        let (broker, port) = self.mqtt_options.broker_address();
        let (client, mut event_loop) =
            AsyncClient::new(self.mqtt_options.clone(), REQUEST_CHANNEL_SIZE);

        match tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => info!("Connected to MQTT broker {}:{}", broker, port),
            Ok(Err(e)) => return Err(Box::new(e)),
            Err(_) => {
                return Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("No answer from MQTT broker {}:{}", broker, port),
                )));
            }
        }

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let subscriptions = self.subscriptions.clone();
        let resubscriber = client.clone();

        // Spawn background task to poll event loop
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = BusMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                            retain: publish.retain,
                        };

                        // Send to channel; if receiver dropped, exit
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Reconnected to MQTT broker");
                        let topics = match subscriptions.lock() {
                            Ok(topics) => topics.clone(),
                            Err(_) => continue,
                        };
                        for topic in topics {
                            if let Err(e) = resubscriber.try_subscribe(topic.as_str(), QoS::AtMostOnce)
                            {
                                warn!("Failed to resubscribe to {}: {}", topic, e);
                            }
                        }
                    }
                    Ok(_) => {
                        // Ignore other events (suback, puback, pings)
                    }
                    Err(e) => {
                        warn!("MQTT event loop error: {}", e);
                        // Sleep briefly before retrying
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.event_loop_task = Some(task);

        Ok(message_rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.push(topic.to_string());
        }
        debug!("Subscribed to {}", topic);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        Ok(())
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
