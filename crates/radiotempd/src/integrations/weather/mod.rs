//! Weather API providers for the online device.

mod openweather;
mod wunderground;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use strum::Display;
use strum::EnumString;

pub use openweather::Openweather;
pub use wunderground::Wunderground;

use crate::engine::Conditions;
use crate::engine::WeatherError;
use crate::engine::WeatherSource;

/// Supported weather APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    Wunderground,
    Openweather,
}

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

/// Everything needed to build a [`Provider`].
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub units: Units,
    pub timeout: Duration,
    /// Override of the provider's API endpoint
    pub base_url: Option<String>,
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            WeatherError::Parse(e.to_string())
        } else {
            WeatherError::Http(e.to_string())
        }
    }
}

/// The configured weather provider.
#[derive(Debug, Clone)]
pub enum Provider {
    Wunderground(Wunderground),
    Openweather(Openweather),
}

impl Provider {
    pub fn new(settings: ProviderSettings) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(match settings.kind {
            ProviderKind::Wunderground => Provider::Wunderground(Wunderground::new(
                client,
                settings.base_url,
                settings.api_key,
                settings.units,
            )),
            ProviderKind::Openweather => Provider::Openweather(Openweather::new(
                client,
                settings.base_url,
                settings.api_key,
                settings.units,
            )),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Wunderground(_) => ProviderKind::Wunderground,
            Provider::Openweather(_) => ProviderKind::Openweather,
        }
    }
}

#[async_trait]
impl WeatherSource for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::Wunderground(_) => "wunderground",
            Provider::Openweather(_) => "openweather",
        }
    }

    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Conditions, WeatherError> {
        match self {
            Provider::Wunderground(p) => p.fetch(latitude, longitude).await,
            Provider::Openweather(p) => p.fetch(latitude, longitude).await,
        }
    }
}

/// GET a JSON document, treating anything but 200 as an error.
async fn get_json(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, WeatherError> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(WeatherError::Status(status.as_u16()));
    }
    Ok(response.json().await?)
}

fn number_at(body: &Value, pointer: &str) -> Result<f64, WeatherError> {
    body.pointer(pointer)
        .and_then(Value::as_f64)
        .ok_or_else(|| WeatherError::Parse(format!("missing number at {}", pointer)))
}

fn text_at(body: &Value, pointer: &str) -> Result<String, WeatherError> {
    match body.pointer(pointer) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(WeatherError::Parse(format!("missing text at {}", pointer))),
    }
}
