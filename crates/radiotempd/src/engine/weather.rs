//! Weather refresh for online devices.
//!
//! A refresh is split in two so that the HTTP call can run off the engine
//! task: [`plan_refresh`] decides whether a fetch is due and where, and
//! [`apply_conditions`] folds the fetch outcome back into the record.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use super::device::DeviceRecord;
use super::location::Position;

/// Current conditions reported by a weather provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub city: String,
    pub temperature: f64,
    pub humidity: f64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Provider answered with status {0}")]
    Status(u16),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

/// A weather provider that can be asked for current conditions.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Provider name, used as the online device's model.
    fn name(&self) -> &str;

    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Conditions, WeatherError>;
}

/// Why a refresh did not go ahead this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    NotOnline,
    NoProvider,
    NoFix,
    NotDue { next_due: DateTime<Utc> },
    InFlight,
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::NotOnline => write!(f, "not an online device"),
            Skip::NoProvider => write!(f, "no usable weather provider"),
            Skip::NoFix => write!(f, "GPS not fixed"),
            Skip::NotDue { next_due } => write!(f, "interval not reached (next at {})", next_due),
            Skip::InFlight => write!(f, "fetch already in progress"),
        }
    }
}

/// Decide whether an online device should be refreshed now.
///
/// Checks, in order: the device is online, a provider exists, a GPS fix is
/// available, the refresh interval has elapsed, and no fetch is in flight.
pub fn plan_refresh(
    record: &DeviceRecord,
    has_provider: bool,
    position: Option<Position>,
    interval: Duration,
    in_flight: bool,
    now: DateTime<Utc>,
) -> Result<Position, Skip> {
    if !record.is_online() {
        return Err(Skip::NotOnline);
    }
    if !has_provider {
        return Err(Skip::NoProvider);
    }
    let position = position.ok_or(Skip::NoFix)?;
    if let Some(last_update) = record.last_update {
        let next_due = last_update + interval;
        if now < next_due {
            return Err(Skip::NotDue { next_due });
        }
    }
    if in_flight {
        return Err(Skip::InFlight);
    }
    Ok(position)
}

/// Write fetched conditions into the record.
///
/// Returns true if the record changed. A failed fetch leaves every field,
/// including `last_update`, untouched.
pub fn apply_conditions(
    record: &mut DeviceRecord,
    outcome: &Result<Conditions, WeatherError>,
) -> bool {
    let Ok(conditions) = outcome else {
        return false;
    };

    record.name = conditions.city.clone();
    record.temperature = Some(conditions.temperature);
    record.humidity = Some(conditions.humidity);
    record.last_update = Some(match record.last_update {
        Some(previous) if previous > conditions.fetched_at => previous,
        _ => conditions.fetched_at,
    });
    true
}

/// Weather source with scripted answers, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedWeather {
    pub answers: std::sync::Mutex<std::collections::VecDeque<Result<Conditions, WeatherError>>>,
    pub calls: std::sync::Mutex<Vec<(f64, f64)>>,
}

#[cfg(test)]
impl ScriptedWeather {
    pub fn new(answers: Vec<Result<Conditions, WeatherError>>) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl WeatherSource for ScriptedWeather {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Conditions, WeatherError> {
        self.calls.lock().unwrap().push((latitude, longitude));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WeatherError::Status(503)))
    }
}
