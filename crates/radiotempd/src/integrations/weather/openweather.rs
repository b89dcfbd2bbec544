use chrono::Utc;
use serde_json::Value;

use super::Units;
use super::get_json;
use super::number_at;
use super::text_at;
use crate::engine::Conditions;
use crate::engine::WeatherError;

/// OpenWeatherMap current weather API.
#[derive(Debug, Clone)]
pub struct Openweather {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    units: Units,
}

impl Openweather {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openweathermap.org/data/2.5/weather";

    pub fn new(
        client: reqwest::Client,
        base_url: Option<String>,
        api_key: String,
        units: Units,
    ) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            api_key,
            units,
        }
    }

    pub async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Conditions, WeatherError> {
        let query = [
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("units", self.units.to_string()),
            ("appid", self.api_key.clone()),
        ];
        let body = get_json(&self.client, &self.base_url, &query).await?;
        parse(&body)
    }
}

fn parse(body: &Value) -> Result<Conditions, WeatherError> {
    Ok(Conditions {
        city: text_at(body, "/name")?,
        temperature: number_at(body, "/main/temp")?,
        humidity: number_at(body, "/main/humidity")?,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse() {
        let body = json!({
            "name": "Bergen",
            "main": {"temp": 9.81, "humidity": 87, "pressure": 1009}
        });
        let conditions = parse(&body).unwrap();
        assert_eq!(conditions.city, "Bergen");
        assert_eq!(conditions.temperature, 9.81);
        assert_eq!(conditions.humidity, 87.0);
    }

    #[test]
    fn test_parse_missing_fields() {
        assert!(parse(&json!({"main": {"temp": 1.0, "humidity": 2}})).is_err());
        assert!(parse(&json!({"name": "Bergen", "main": {"temp": 1.0}})).is_err());
    }
}
