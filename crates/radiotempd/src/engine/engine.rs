use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use arc_swap::ArcSwap;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::aggregate;
use super::device::DeviceRecord;
use super::export::ExportError;
use super::export::Exporter;
use super::export::ServiceDescriptor;
use super::export::WriteRequest;
use super::export::paths;
use super::ingest::IngestOutcome;
use super::ingest::Ingestor;
use super::location::GpsTracker;
use super::location::Position;
use super::message::BusMessage;
use super::message::WeatherOutcome;
use super::registry::Entry;
use super::registry::Registry;
use super::registry::RegistryError;
use super::state::DeviceSnapshot;
use super::state::State;
use super::weather::WeatherSource;
use super::weather::apply_conditions;
use super::weather::plan_refresh;
use crate::config::Config;

/// Period of the publish cycle
pub const TICK_PERIOD: StdDuration = StdDuration::from_secs(1);

/// Capacity for the fetch task -> engine outcome channel
const WEATHER_OUTCOME_CHANNEL_SIZE: usize = 16;

/// Engine knobs derived from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Device instance of the first registered device
    pub first_instance: u32,
    pub refresh_interval: Duration,
    pub aggregate: bool,
    pub gps_path: String,
    pub gps_max_age: Option<Duration>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            first_instance: config.export.first_instance,
            refresh_interval: Duration::minutes(i64::from(config.online.interval_minutes)),
            aggregate: config.aggregation_enabled(),
            gps_path: config.gps.path.clone(),
            gps_max_age: config.gps.max_age(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            first_instance: 40,
            refresh_interval: Duration::minutes(10),
            aggregate: false,
            gps_path: "venus/com.victronenergy.gps.ve_ttyACM0".to_string(),
            gps_max_age: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to register {key} on the export layer: {source}")]
    Register { key: String, source: ExportError },

    #[error("Device instance for {key} does not fit after first instance {first_instance}")]
    InstanceRange { key: String, first_instance: u32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// radiotempd engine
///
/// Owns every device record. Bus messages, weather outcomes and the publish
/// tick are handled one at a time on the task that calls [`Engine::run`].
pub struct Engine {
    settings: EngineSettings,
    registry: Registry,
    ingestor: Ingestor,
    gps: GpsTracker,
    exporter: Arc<dyn Exporter>,
    weather: Option<Arc<dyn WeatherSource>>,

    /// Keys of online devices with a fetch running
    in_flight: HashSet<String>,
    outcome_tx: mpsc::Sender<WeatherOutcome>,
    outcome_rx: Option<mpsc::Receiver<WeatherOutcome>>,

    /// Snapshot for readers outside the engine task (readers load the Arc, the engine stores a new one)
    state: Arc<ArcSwap<State>>,
}

impl Engine {
    /// Register every record on the export layer and build the engine.
    ///
    /// Records are registered in order; the n-th gets device instance
    /// `first_instance + n`. A failed registration aborts construction.
    pub async fn new(
        settings: EngineSettings,
        records: Vec<DeviceRecord>,
        exporter: Arc<dyn Exporter>,
        weather: Option<Arc<dyn WeatherSource>>,
    ) -> Result<Self, EngineError> {
        let mut registry = Registry::new();
        for (i, record) in records.into_iter().enumerate() {
            let key = record.key();
            if registry.contains(&key) {
                return Err(RegistryError::Duplicate(key).into());
            }

            let instance = u32::try_from(i)
                .ok()
                .and_then(|i| settings.first_instance.checked_add(i))
                .ok_or_else(|| EngineError::InstanceRange {
                    key: key.clone(),
                    first_instance: settings.first_instance,
                })?;
            let descriptor = ServiceDescriptor::for_device(&record, instance);
            let handle = exporter
                .register(&descriptor)
                .await
                .map_err(|source| EngineError::Register {
                    key: key.clone(),
                    source,
                })?;
            info!(
                "Registered {} ({}) as {} instance {}",
                key, record.name, handle.service_name, handle.instance
            );
            registry.register(key, record, handle)?;
        }

        let ingestor = Ingestor::from_registry(&registry);
        let gps = GpsTracker::new(&settings.gps_path, settings.gps_max_age);
        let (outcome_tx, outcome_rx) = mpsc::channel(WEATHER_OUTCOME_CHANNEL_SIZE);

        let engine = Self {
            settings,
            registry,
            ingestor,
            gps,
            exporter,
            weather,
            in_flight: HashSet::new(),
            outcome_tx,
            outcome_rx: Some(outcome_rx),
            state: Arc::default(),
        };
        engine.publish_state();
        Ok(engine)
    }

    /// Topic filters the engine needs to receive.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.ingestor.topics().map(str::to_string).collect();
        topics.extend(self.gps.topics().iter().map(|t| t.to_string()));
        topics.extend(self.exporter.write_filter());
        topics
    }

    /// Shared handle to the latest device snapshot.
    pub fn state_handle(&self) -> Arc<ArcSwap<State>> {
        self.state.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the engine's main loop until `shutdown` resolves or the bus closes.
    pub async fn run<F>(mut self, mut bus_rx: mpsc::UnboundedReceiver<BusMessage>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Engine starting with {} devices", self.registry.len());

        let Some(mut outcome_rx) = self.outcome_rx.take() else {
            warn!("Engine already ran, not starting again");
            return;
        };

        let mut ticker = tokio::time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                msg = bus_rx.recv() => match msg {
                    Some(msg) => self.handle_bus_message(msg, Utc::now()).await,
                    None => {
                        warn!("Bus connection closed");
                        break;
                    }
                },
                Some(outcome) = outcome_rx.recv() => self.apply_weather_outcome(outcome).await,
                _ = ticker.tick() => self.tick(Utc::now()).await,
            }
        }

        info!("Engine shutting down");
    }

    /// Route one inbound bus message.
    pub async fn handle_bus_message(&mut self, msg: BusMessage, now: DateTime<Utc>) {
        if self.ingestor.owns(&msg.topic) {
            match self
                .ingestor
                .handle(&mut self.registry, &msg.topic, &msg.payload)
            {
                Ok(IngestOutcome::Applied { .. }) => {}
                Ok(IngestOutcome::UnknownDevice { key }) => {
                    debug!("No device registered for {}, dropping reading", key);
                }
                Ok(IngestOutcome::UnknownTopic) => {
                    debug!("Message on {} is not in configured topics", msg.topic);
                }
                Err(e) => {
                    warn!(
                        "Dropping reading on {}: {} (payload: {})",
                        msg.topic,
                        e,
                        String::from_utf8_lossy(&msg.payload)
                    );
                }
            }
            return;
        }

        if self.gps.owns(&msg.topic) {
            if let Err(e) = self.gps.update(&msg.topic, &msg.payload, now) {
                warn!("{}", e);
            }
            return;
        }

        if let Some(write) = self.exporter.parse_write(&msg.topic, &msg.payload) {
            if msg.retain {
                debug!("Ignoring retained write on {}", msg.topic);
                return;
            }
            self.handle_write(write).await;
            return;
        }

        debug!("Message on {} is not in configured topics", msg.topic);
    }

    /// One publish cycle.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        self.refresh_online(now);

        if self.settings.aggregate {
            match aggregate::recompute(&mut self.registry) {
                Some(average) if average.contributors == 0 => {
                    debug!("No outdoor readings yet, aggregate unchanged");
                }
                Some(average) => debug!(
                    "Outdoor average over {} devices: temperature={:?}, humidity={:?}",
                    average.contributors, average.temperature, average.humidity
                ),
                None => {}
            }
        }

        let exporter = self.exporter.clone();
        for entry in self.registry.entries_mut() {
            if let Err(e) = push_readings(exporter.as_ref(), entry).await {
                warn!("Failed to publish readings for {}: {}", entry.record.key(), e);
            }
        }

        self.publish_state();
    }

    /// Fold a finished weather fetch back into its device.
    pub async fn apply_weather_outcome(&mut self, outcome: WeatherOutcome) {
        self.in_flight.remove(&outcome.key);

        let entry = match self.registry.entry_mut(&outcome.key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Weather outcome for unregistered device: {}", e);
                return;
            }
        };

        if let Err(e) = &outcome.result {
            debug!("Weather fetch for {} failed: {}", outcome.key, e);
            return;
        }
        if !apply_conditions(&mut entry.record, &outcome.result) {
            return;
        }

        let record = &entry.record;
        info!(
            "Weather for {}: {} temperature={:?} humidity={:?}",
            outcome.key, record.name, record.temperature, record.humidity
        );

        entry.custom_name = record.name.clone();
        let value = json!(entry.custom_name);
        if let Err(e) = self
            .exporter
            .set(&entry.handle, paths::CUSTOM_NAME, value)
            .await
        {
            warn!("Failed to publish name for {}: {}", outcome.key, e);
        }
    }

    fn refresh_online(&mut self, now: DateTime<Utc>) {
        let position = self.gps.position(now);
        let keys: Vec<String> = self
            .registry
            .records_where(|r| r.is_online())
            .map(|r| r.key())
            .collect();

        for key in keys {
            let Ok(record) = self.registry.get(&key) else {
                continue;
            };
            let plan = plan_refresh(
                record,
                self.weather.is_some(),
                position,
                self.settings.refresh_interval,
                self.in_flight.contains(&key),
                now,
            );
            match plan {
                Ok(position) => self.spawn_fetch(key, position),
                Err(skip) => debug!("Online device {} not refreshed: {}", key, skip),
            }
        }
    }

    fn spawn_fetch(&mut self, key: String, position: Position) {
        let Some(source) = self.weather.clone() else {
            return;
        };

        debug!(
            "Fetching weather for {} from {} at {}, {}",
            key,
            source.name(),
            position.latitude,
            position.longitude
        );
        self.in_flight.insert(key.clone());

        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch(position.latitude, position.longitude).await;
            if tx.send(WeatherOutcome { key, result }).await.is_err() {
                debug!("Engine gone, dropping weather outcome");
            }
        });
    }

    /// External writes are acknowledged by republishing the current value.
    async fn handle_write(&mut self, write: WriteRequest) {
        let Some(entry) = self.registry.find_by_service(&write.service_name) else {
            warn!(
                "Write to unknown service {}{} ignored",
                write.service_name, write.path
            );
            return;
        };

        let descriptor = ServiceDescriptor::for_device(&entry.record, entry.handle.instance);
        if !descriptor.is_writeable(&write.path) {
            warn!(
                "Write to read-only path {}{} ignored",
                write.service_name, write.path
            );
            return;
        }

        debug!(
            "Change from outside {}{} to {}, keeping {}",
            write.service_name,
            write.path,
            write.value,
            entry.record.key()
        );
        let current = current_value(entry, &write.path);
        if let Err(e) = self.exporter.set(&entry.handle, &write.path, current).await {
            warn!("Failed to acknowledge write to {}: {}", write.path, e);
        }
    }

    fn publish_state(&self) {
        let devices = self.registry.entries().map(DeviceSnapshot::from).collect();
        self.state.store(Arc::new(State { devices }));
    }

    #[cfg(test)]
    async fn next_outcome(&mut self) -> Option<WeatherOutcome> {
        self.outcome_rx.as_mut()?.recv().await
    }
}

/// Push the readings and the next update index for one device.
///
/// Every value is pushed even if an earlier one fails; the first error is
/// returned.
async fn push_readings(exporter: &dyn Exporter, entry: &mut Entry) -> Result<(), ExportError> {
    let index = entry.bump_update_index();
    let record = &entry.record;

    let mut values = vec![
        (paths::TEMPERATURE, json!(record.temperature)),
        (paths::HUMIDITY, json!(record.humidity)),
    ];
    if let Some(pressure) = record.pressure {
        values.push((paths::PRESSURE, json!(pressure)));
    }
    values.push((paths::UPDATE_INDEX, json!(index)));

    let mut first_error = None;
    for (path, value) in values {
        if let Err(e) = exporter.set(&entry.handle, path, value).await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn current_value(entry: &Entry, path: &str) -> Value {
    let record = &entry.record;
    match path {
        paths::TEMPERATURE => json!(record.temperature),
        paths::HUMIDITY => json!(record.humidity),
        paths::PRESSURE => json!(record.pressure),
        paths::STATUS => json!(0),
        paths::TEMPERATURE_TYPE => json!(record.device_type().code()),
        paths::CUSTOM_NAME => json!(entry.custom_name),
        paths::UPDATE_INDEX => json!(entry.update_index()),
        _ => Value::Null,
    }
}
