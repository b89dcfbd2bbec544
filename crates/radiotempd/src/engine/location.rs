//! GPS position as mirrored from the monitoring bus.

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde_json::Value;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    received_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("GPS payload on {topic} is neither a number, null nor {{\"value\": ...}}")]
pub struct LocationError {
    topic: String,
}

/// Latest `Position/Latitude` and `Position/Longitude` seen under the GPS path.
#[derive(Debug)]
pub struct GpsTracker {
    latitude_topic: String,
    longitude_topic: String,
    max_age: Option<Duration>,
    latitude: Option<Sample>,
    longitude: Option<Sample>,
}

impl GpsTracker {
    pub fn new(path: &str, max_age: Option<Duration>) -> Self {
        let path = path.trim_end_matches('/');
        Self {
            latitude_topic: format!("{}/Position/Latitude", path),
            longitude_topic: format!("{}/Position/Longitude", path),
            max_age,
            latitude: None,
            longitude: None,
        }
    }

    pub fn topics(&self) -> [&str; 2] {
        [self.latitude_topic.as_str(), self.longitude_topic.as_str()]
    }

    pub fn owns(&self, topic: &str) -> bool {
        topic == self.latitude_topic || topic == self.longitude_topic
    }

    /// Record a coordinate update. A null value clears the coordinate.
    pub fn update(
        &mut self,
        topic: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), LocationError> {
        let slot = if topic == self.latitude_topic {
            &mut self.latitude
        } else if topic == self.longitude_topic {
            &mut self.longitude
        } else {
            return Ok(());
        };

        let value = parse_coordinate(payload).ok_or_else(|| LocationError {
            topic: topic.to_string(),
        })?;
        *slot = value.map(|value| Sample {
            value,
            received_at: now,
        });
        Ok(())
    }

    /// Current fix, if both coordinates are known and not stale.
    pub fn position(&self, now: DateTime<Utc>) -> Option<Position> {
        let latitude = self.fresh(self.latitude, now)?;
        let longitude = self.fresh(self.longitude, now)?;
        Some(Position {
            latitude,
            longitude,
        })
    }

    fn fresh(&self, sample: Option<Sample>, now: DateTime<Utc>) -> Option<f64> {
        let sample = sample?;
        match self.max_age {
            Some(max_age) if now - sample.received_at > max_age => None,
            _ => Some(sample.value),
        }
    }
}

/// `Some(None)` is an explicit null, `None` is an unreadable payload.
fn parse_coordinate(payload: &[u8]) -> Option<Option<f64>> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let value = match value {
        Value::Object(mut map) => map.remove("value")?,
        other => other,
    };
    match value {
        Value::Null => Some(None),
        Value::Number(n) => n.as_f64().map(Some),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_age: Option<Duration>) -> GpsTracker {
        GpsTracker::new("venus/com.victronenergy.gps.ve_ttyACM0/", max_age)
    }

    const LAT: &str = "venus/com.victronenergy.gps.ve_ttyACM0/Position/Latitude";
    const LON: &str = "venus/com.victronenergy.gps.ve_ttyACM0/Position/Longitude";

    #[test]
    fn test_topics() {
        let gps = tracker(None);
        assert_eq!(gps.topics(), [LAT, LON]);
        assert!(gps.owns(LAT));
        assert!(!gps.owns("venus/other"));
    }

    #[test]
    fn test_needs_both_coordinates() {
        let now = Utc::now();
        let mut gps = tracker(None);
        assert_eq!(gps.position(now), None);

        gps.update(LAT, br#"{"value": 59.91}"#, now).unwrap();
        assert_eq!(gps.position(now), None);

        gps.update(LON, b"10.75", now).unwrap();
        assert_eq!(
            gps.position(now),
            Some(Position {
                latitude: 59.91,
                longitude: 10.75
            })
        );
    }

    #[test]
    fn test_null_clears_fix() {
        let now = Utc::now();
        let mut gps = tracker(None);
        gps.update(LAT, b"59.91", now).unwrap();
        gps.update(LON, b"10.75", now).unwrap();
        gps.update(LON, br#"{"value": null}"#, now).unwrap();
        assert_eq!(gps.position(now), None);
    }

    #[test]
    fn test_stale_fix() {
        let now = Utc::now();
        let mut gps = tracker(Some(Duration::minutes(10)));
        gps.update(LAT, b"59.91", now).unwrap();
        gps.update(LON, b"10.75", now).unwrap();

        assert!(gps.position(now + Duration::minutes(9)).is_some());
        assert_eq!(gps.position(now + Duration::minutes(11)), None);
    }

    #[test]
    fn test_bad_payload_keeps_previous_value() {
        let now = Utc::now();
        let mut gps = tracker(None);
        gps.update(LAT, b"59.91", now).unwrap();
        gps.update(LON, b"10.75", now).unwrap();

        assert!(gps.update(LAT, b"\"north\"", now).is_err());
        assert!(gps.update(LAT, b"{garbage", now).is_err());
        assert_eq!(gps.position(now).map(|p| p.latitude), Some(59.91));
    }
}
