use std::io::Write;

use radiotempd::Config;
use radiotempd::config::ConfigError;
use radiotempd::config::LogLevel;
use radiotempd::config::Warning;
use radiotempd::engine::DeviceType;
use radiotempd::integrations::weather::ProviderKind;
use radiotempd::integrations::weather::Units;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_config() {
    let file = write_config(
        r#"
        [logging]
        level = "debug"

        [logging.overrides]
        "radiotempd::api" = "warn"

        [mqtt]
        broker = "venus.local"
        port = 1884
        client_id = "radiotempd"
        username = "pi"
        password = "raspberry"

        [[devices]]
        name = "Fridge"
        model = "Nexus-TH"
        channel = 1
        topic = "rtl_433/Nexus-TH/1"
        temperature_field = "temperature_C"
        device_type = "fridge"

        [[devices]]
        name = "Aft Deck"
        model = "Acurite-Tower"
        channel = "A"
        topic = "rtl_433/Acurite-Tower/A"
        temperature_field = "temperature_C"
        device_type = 4

        [online]
        enabled = true
        provider = "wunderground"
        api_key = "abc"
        units = "imperial"
        interval_minutes = 15
        timeout_secs = 5

        [aggregate]
        enabled = true

        [gps]
        path = "venus/com.victronenergy.gps.ve_ttyUSB0"
        max_age_secs = 300

        [export]
        prefix = "N/c0619ab1234"
        first_instance = 50

        [api]
        port = 9000

        [demodulator]
        command = "/data/RadioTemperature/bin/rtl_433"
        args = ["-c", "/data/RadioTemperature/bin/rtl.conf"]
        "#,
    );

    let (config, diagnostics) = Config::from_file(file.path()).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.mqtt.port, 1884);
    assert_eq!(config.mqtt.username.as_deref(), Some("pi"));
    assert_eq!(config.devices[1].channel, "A");
    assert_eq!(config.devices[1].device_type, DeviceType::Outdoor);
    assert_eq!(config.gps.max_age_secs, Some(300));
    assert_eq!(config.export.first_instance, 50);

    let api = config.api.as_ref().unwrap();
    assert_eq!(api.listen, "127.0.0.1");
    assert_eq!(api.port, 9000);
    assert_eq!(config.demodulator.as_ref().unwrap().args.len(), 2);

    let settings = config.online.provider_settings().unwrap();
    assert_eq!(settings.kind, ProviderKind::Wunderground);
    assert_eq!(settings.units, Units::Imperial);

    let keys: Vec<_> = config.device_records().iter().map(|r| r.key()).collect();
    assert_eq!(
        keys,
        vec![
            "Nexus-TH_1",
            "Acurite-Tower_A",
            "wunderground_1",
            "aggregate_1"
        ]
    );
}

#[test]
fn test_warnings_are_returned() {
    let file = write_config(
        r#"
        [mqtt]
        broker = "localhost"

        [online]
        enabled = true
        provider = "openweather"
        "#,
    );

    let (config, diagnostics) = Config::from_file(file.path()).unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        diagnostics[0],
        radiotempd::Diagnostic::Warning(Warning::MissingApiKey { .. })
    ));
    assert!(config.online.provider_settings().is_none());
    assert_eq!(config.device_records().len(), 1);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn test_missing_mqtt_section() {
    let file = write_config("[aggregate]\nenabled = false\n");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_bad_device_type() {
    let file = write_config(
        r#"
        [mqtt]
        broker = "localhost"

        [[devices]]
        name = "Sauna"
        model = "Nexus-TH"
        channel = 1
        topic = "rtl_433/events"
        temperature_field = "temperature_C"
        device_type = "sauna"
        "#,
    );
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("sauna"));
}

#[test]
fn test_sample_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../radiotempd.toml");
    let (config, diagnostics) = Config::from_file(path).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert_eq!(config.device_records().len(), 2);
}
