use chrono::Utc;
use serde_json::Value;

use super::Units;
use super::get_json;
use super::number_at;
use super::text_at;
use crate::engine::Conditions;
use crate::engine::WeatherError;

/// Weather Underground personal weather station API.
///
/// A fetch is two requests: find the nearest station, then read its
/// current observation.
#[derive(Debug, Clone)]
pub struct Wunderground {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    units: Units,
}

#[derive(Debug, Clone, PartialEq)]
struct Station {
    name: String,
    id: String,
}

impl Wunderground {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.weather.com";

    pub fn new(
        client: reqwest::Client,
        base_url: Option<String>,
        api_key: String,
        units: Units,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            units,
        }
    }

    pub async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Conditions, WeatherError> {
        let near = get_json(
            &self.client,
            &format!("{}/v3/location/near", self.base_url),
            &[
                ("geocode", format!("{},{}", latitude, longitude)),
                ("product", "pws".to_string()),
                ("format", "json".to_string()),
                ("apiKey", self.api_key.clone()),
            ],
        )
        .await?;
        let station = parse_station(&near)?;

        let observation = get_json(
            &self.client,
            &format!("{}/v2/pws/observations/current", self.base_url),
            &[
                ("stationId", station.id.clone()),
                ("format", "json".to_string()),
                ("units", units_code(self.units).to_string()),
                ("apiKey", self.api_key.clone()),
            ],
        )
        .await?;
        parse_observation(&observation, station.name, self.units)
    }
}

/// `m` for metric, `e` for imperial ("English")
fn units_code(units: Units) -> &'static str {
    match units {
        Units::Metric => "m",
        Units::Imperial => "e",
    }
}

fn parse_station(body: &Value) -> Result<Station, WeatherError> {
    Ok(Station {
        name: text_at(body, "/location/stationName/0")?,
        id: text_at(body, "/location/stationId/0")?,
    })
}

fn parse_observation(body: &Value, city: String, units: Units) -> Result<Conditions, WeatherError> {
    let temperature = format!("/observations/0/{}/temp", units);
    Ok(Conditions {
        city,
        temperature: number_at(body, &temperature)?,
        humidity: number_at(body, "/observations/0/humidity")?,
        fetched_at: Utc::now(),
    })
}
