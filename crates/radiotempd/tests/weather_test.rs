use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use radiotempd::engine::WeatherError;
use radiotempd::engine::WeatherSource;
use radiotempd::integrations::weather::Provider;
use radiotempd::integrations::weather::ProviderKind;
use radiotempd::integrations::weather::ProviderSettings;
use radiotempd::integrations::weather::Units;
use serde_json::json;
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn provider(kind: ProviderKind, base_url: String, units: Units) -> Provider {
    Provider::new(ProviderSettings {
        kind,
        api_key: "test-key".to_string(),
        units,
        timeout: Duration::from_millis(500),
        base_url: Some(base_url),
    })
    .unwrap()
}

async fn openweather(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    if query.get("appid").map(String::as_str) != Some("test-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"cod": 401}))).into_response();
    }
    let temp = match query.get("units").map(String::as_str) {
        Some("imperial") => 50.0,
        _ => 10.0,
    };
    Json(json!({
        "name": format!("{},{}", query["lat"], query["lon"]),
        "main": {"temp": temp, "humidity": 76}
    }))
    .into_response()
}

#[tokio::test]
async fn test_openweather_fetch() {
    let base = serve(Router::new().route("/weather", get(openweather))).await;
    let url = format!("{}/weather", base);

    let conditions = provider(ProviderKind::Openweather, url.clone(), Units::Metric)
        .fetch(59.5, 10.25)
        .await
        .unwrap();
    assert_eq!(conditions.city, "59.5,10.25");
    assert_eq!(conditions.temperature, 10.0);
    assert_eq!(conditions.humidity, 76.0);

    let conditions = provider(ProviderKind::Openweather, url, Units::Imperial)
        .fetch(59.5, 10.25)
        .await
        .unwrap();
    assert_eq!(conditions.temperature, 50.0);
}

#[tokio::test]
async fn test_openweather_rejected_key() {
    let base = serve(Router::new().route("/weather", get(openweather))).await;
    let provider = Provider::new(ProviderSettings {
        kind: ProviderKind::Openweather,
        api_key: "wrong".to_string(),
        units: Units::Metric,
        timeout: Duration::from_millis(500),
        base_url: Some(format!("{}/weather", base)),
    })
    .unwrap();

    let err = provider.fetch(1.0, 2.0).await.unwrap_err();
    assert!(matches!(err, WeatherError::Status(401)));
}

#[tokio::test]
async fn test_openweather_incomplete_payload() {
    let router = Router::new().route(
        "/weather",
        get(|| async { Json(json!({"main": {"temp": 1.0, "humidity": 2}})) }),
    );
    let base = serve(router).await;

    let err = provider(ProviderKind::Openweather, format!("{}/weather", base), Units::Metric)
        .fetch(1.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::Parse(_)));
}

#[tokio::test]
async fn test_openweather_not_json() {
    let router = Router::new().route("/weather", get(|| async { "<html>busy</html>" }));
    let base = serve(router).await;

    let err = provider(ProviderKind::Openweather, format!("{}/weather", base), Units::Metric)
        .fetch(1.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::Parse(_)));
}

#[tokio::test]
async fn test_timeout() {
    let router = Router::new().route(
        "/weather",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({}))
        }),
    );
    let base = serve(router).await;

    let err = provider(ProviderKind::Openweather, format!("{}/weather", base), Units::Metric)
        .fetch(1.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::Http(_)));
}

#[tokio::test]
async fn test_unreachable_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = provider(ProviderKind::Openweather, format!("http://{}/weather", addr), Units::Metric)
        .fetch(1.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::Http(_)));
}

async fn near(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    assert_eq!(query["geocode"], "59.5,10.25");
    assert_eq!(query["product"], "pws");
    assert_eq!(query["apiKey"], "test-key");
    Json(json!({
        "location": {
            "stationName": ["Harbour", "Hill"],
            "stationId": ["IHARBOUR1", "IHILL2"]
        }
    }))
}

async fn observations(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    if query.get("stationId").map(String::as_str) != Some("IHARBOUR1") {
        return StatusCode::NO_CONTENT.into_response();
    }
    let body = match query["units"].as_str() {
        "m" => json!({"observations": [{"humidity": 64, "metric": {"temp": 18.0}}]}),
        "e" => json!({"observations": [{"humidity": 64, "imperial": {"temp": 64.4}}]}),
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };
    Json(body).into_response()
}

fn wunderground_router() -> Router {
    Router::new()
        .route("/v3/location/near", get(near))
        .route("/v2/pws/observations/current", get(observations))
}

#[tokio::test]
async fn test_wunderground_fetch() {
    let base = serve(wunderground_router()).await;

    let conditions = provider(ProviderKind::Wunderground, base.clone(), Units::Metric)
        .fetch(59.5, 10.25)
        .await
        .unwrap();
    assert_eq!(conditions.city, "Harbour");
    assert_eq!(conditions.temperature, 18.0);
    assert_eq!(conditions.humidity, 64.0);

    let conditions = provider(ProviderKind::Wunderground, format!("{}/", base), Units::Imperial)
        .fetch(59.5, 10.25)
        .await
        .unwrap();
    assert_eq!(conditions.temperature, 64.4);
}

#[tokio::test]
async fn test_wunderground_no_station() {
    let router = Router::new().route(
        "/v3/location/near",
        get(|| async { Json(json!({"location": {"stationName": [], "stationId": []}})) }),
    );
    let base = serve(router).await;

    let err = provider(ProviderKind::Wunderground, base, Units::Metric)
        .fetch(59.5, 10.25)
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::Parse(_)));
}
