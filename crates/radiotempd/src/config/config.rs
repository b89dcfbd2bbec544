//! Configuration file parsing and structures.
//!
//! radiotempd uses a single TOML file. Serde handles the shape and defaults;
//! [`Config::validate`] handles cross-field rules and reports them as
//! [`Diagnostic`]s.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::Diagnostic;
use super::diagnostics::Warning;
use super::format_diagnostics;
use crate::engine::DeviceRecord;
use crate::engine::DeviceType;
use crate::engine::deserialize_channel;
use crate::engine::normalize_name;
use crate::integrations::mqtt::MqttConfig;
use crate::integrations::rtl433::Config as DemodulatorConfig;
use crate::integrations::weather::ProviderKind;
use crate::integrations::weather::ProviderSettings;
use crate::integrations::weather::Units;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    pub mqtt: MqttConfig,

    /// Radio sensors, in device instance order
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub online: OnlineConfig,

    #[serde(default)]
    pub aggregate: AggregateConfig,

    #[serde(default)]
    pub gps: GpsConfig,

    #[serde(default)]
    pub export: ExportConfig,

    /// HTTP status API, disabled when absent
    #[serde(default)]
    pub api: Option<ApiConfig>,

    /// rtl_433 supervision, disabled when absent
    #[serde(default)]
    pub demodulator: Option<DemodulatorConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"radiotempd::engine" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the log filter. With `debug` set, no target logs below DEBUG.
    pub fn targets(&self, debug: bool) -> Targets {
        let floor = |level: LevelFilter| {
            if debug {
                level.max(LevelFilter::DEBUG)
            } else {
                level
            }
        };
        self.overrides.iter().fold(
            Targets::new().with_default(floor(self.level.into())),
            |targets, (target, level)| targets.with_target(target.clone(), floor((*level).into())),
        )
    }
}

/// One radio sensor
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Display name, also used for the service name
    pub name: String,

    /// rtl_433 model string
    pub model: String,

    /// rtl_433 channel (string or integer)
    #[serde(deserialize_with = "deserialize_channel")]
    pub channel: String,

    /// Topic rtl_433 publishes this sensor's readings on
    pub topic: String,

    /// JSON field carrying the temperature, e.g. `temperature_C`
    pub temperature_field: String,

    /// Device type name (`outdoor`) or code (`4`)
    pub device_type: DeviceType,
}

impl DeviceConfig {
    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord::radio(
            self.name.clone(),
            self.model.clone(),
            self.channel.clone(),
            self.topic.clone(),
            self.temperature_field.clone(),
            self.device_type,
        )
    }
}

fn default_provider() -> String {
    "wunderground".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_interval_minutes() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    10
}

/// The weather-backed online device
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnlineConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `wunderground` or `openweather`
    #[serde(default = "default_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    /// `metric` or `imperial`
    #[serde(default = "default_units")]
    pub units: String,

    /// Minutes between successful refreshes
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// HTTP timeout per request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Override of the provider endpoint
    pub base_url: Option<String>,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            api_key: None,
            units: default_units(),
            interval_minutes: default_interval_minutes(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
        }
    }
}

impl OnlineConfig {
    pub fn provider_kind(&self) -> Option<ProviderKind> {
        self.provider.parse().ok()
    }

    /// Configured units, metric if unrecognized.
    pub fn units(&self) -> Units {
        self.units.parse().unwrap_or_default()
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    /// Settings for the weather client, or `None` if refreshing is impossible.
    pub fn provider_settings(&self) -> Option<ProviderSettings> {
        if !self.enabled {
            return None;
        }
        Some(ProviderSettings {
            kind: self.provider_kind()?,
            api_key: self.api_key()?.to_string(),
            units: self.units(),
            timeout: Duration::from_secs(self.timeout_secs),
            base_url: self.base_url.clone(),
        })
    }

    /// Model of the online device record.
    fn model(&self) -> String {
        match self.provider_kind() {
            Some(kind) => kind.to_string(),
            None => self.provider.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    /// Publish an "Outdoor" device averaging all outdoor sensors
    #[serde(default)]
    pub enabled: bool,
}

fn default_gps_path() -> String {
    "venus/com.victronenergy.gps.ve_ttyACM0".to_string()
}

/// Where the GPS position is mirrored on the bus
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpsConfig {
    /// Topic prefix of the GPS service; `/Position/Latitude` and
    /// `/Position/Longitude` are appended
    #[serde(default = "default_gps_path")]
    pub path: String,

    /// Treat a fix older than this as missing
    pub max_age_secs: Option<u64>,
}

impl GpsConfig {
    /// Maximum fix age, `None` when unset or too large to represent
    pub fn max_age(&self) -> Option<chrono::TimeDelta> {
        let secs = i64::try_from(self.max_age_secs?).ok()?;
        chrono::TimeDelta::try_seconds(secs)
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            path: default_gps_path(),
            max_age_secs: None,
        }
    }
}

fn default_export_prefix() -> String {
    "venus".to_string()
}

fn default_first_instance() -> u32 {
    40
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Topic prefix for exported services
    #[serde(default = "default_export_prefix")]
    pub prefix: String,

    /// Device instance of the first device
    #[serde(default = "default_first_instance")]
    pub first_instance: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            prefix: default_export_prefix(),
            first_instance: default_first_instance(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns the config together with any warnings. Validation errors are
    /// returned as [`ConfigError::Invalid`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let config: Config = toml::from_str(contents)?;
        let diagnostics = config.validate();
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ConfigError::Invalid(diagnostics));
        }
        Ok((config, diagnostics))
    }

    /// Aggregation only runs alongside the online device.
    pub fn aggregation_enabled(&self) -> bool {
        self.aggregate.enabled && self.online.enabled
    }

    /// Every device record to register, in device instance order: radio
    /// devices, then the online device, then the aggregate.
    pub fn device_records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.iter().map(DeviceConfig::to_record).collect();
        if self.online.enabled {
            records.push(DeviceRecord::online(self.online.model()));
        }
        if self.aggregation_enabled() {
            records.push(DeviceRecord::aggregate());
        }
        records
    }

    /// Check cross-field rules
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.devices.is_empty() && !self.online.enabled {
            diagnostics.push(Diagnostic::Warning(Warning::NoDevices));
        }
        if self.aggregate.enabled && !self.online.enabled {
            diagnostics.push(Diagnostic::Warning(Warning::AggregateWithoutOnline));
        }

        if self.online.enabled {
            if self.online.provider_kind().is_none() {
                diagnostics.push(Diagnostic::Warning(Warning::UnknownProvider {
                    provider: self.online.provider.clone(),
                }));
            }
            if self.online.units.parse::<Units>().is_err() {
                diagnostics.push(Diagnostic::Warning(Warning::InvalidUnits {
                    units: self.online.units.clone(),
                }));
            }
            if self.online.api_key().is_none() {
                diagnostics.push(Diagnostic::Warning(Warning::MissingApiKey {
                    provider: self.online.provider.clone(),
                }));
            }
            if self.online.timeout_secs == 0 {
                diagnostics.push(Diagnostic::error(
                    "online.timeout_secs",
                    "must be at least 1",
                ));
            }
        }

        for (i, device) in self.devices.iter().enumerate() {
            if device.name.trim().is_empty() {
                diagnostics.push(Diagnostic::error(
                    format!("devices[{}].name", i),
                    "must not be empty",
                ));
            }
            if device.temperature_field.is_empty() {
                diagnostics.push(Diagnostic::error(
                    format!("devices[{}].temperature_field", i),
                    "must not be empty",
                ));
            }
        }

        if self.gps.max_age_secs.is_some() && self.gps.max_age().is_none() {
            diagnostics.push(Diagnostic::error(
                "gps.max_age_secs",
                "is too large to represent",
            ));
        }

        let records = self.device_records();
        let last_offset = u32::try_from(records.len().saturating_sub(1)).ok();
        if last_offset
            .and_then(|n| self.export.first_instance.checked_add(n))
            .is_none()
        {
            diagnostics.push(Diagnostic::error(
                "export.first_instance",
                format!(
                    "{} devices do not fit after instance {}",
                    records.len(),
                    self.export.first_instance
                ),
            ));
        }

        let mut keys = HashSet::new();
        let mut services = HashSet::new();
        for (i, record) in records.iter().enumerate() {
            let field_path = if i < self.devices.len() {
                format!("devices[{}]", i)
            } else if record.is_online() {
                "online".to_string()
            } else {
                "aggregate".to_string()
            };

            let key = record.key();
            if !keys.insert(key.clone()) {
                diagnostics.push(Diagnostic::error(
                    field_path.clone(),
                    format!("duplicate device key '{}'", key),
                ));
            }
            let service = normalize_name(&record.name);
            if !services.insert(service.clone()) {
                diagnostics.push(Diagnostic::error(
                    field_path,
                    format!("name '{}' collides with another device as '{}'", record.name, service),
                ));
            }
        }

        diagnostics
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration:\n{}", format_diagnostics(.0))]
    Invalid(Vec<Diagnostic>),
}
