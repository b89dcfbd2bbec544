use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::anyhow;
use clap::Parser;
use radiotempd::Config;
use radiotempd::Engine;
use radiotempd::EngineSettings;
use radiotempd::api;
use radiotempd::config::LoggingConfig;
use radiotempd::engine::WeatherSource;
use radiotempd::integrations::mqtt::MqttClient;
use radiotempd::integrations::mqtt::MqttExporter;
use radiotempd::integrations::mqtt::RumqttcClient;
use radiotempd::integrations::rtl433;
use radiotempd::integrations::weather::Provider;
use tokio::sync::oneshot;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bridge rtl_433 temperature sensors onto the monitoring bus
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(default_value = "radiotempd.toml")]
    config: PathBuf,

    /// Log at debug level regardless of the configured level
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, diagnostics) = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    init_tracing(&config.logging, args.debug);

    tracing::info!("radiotempd {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {}", args.config.display());
    for diagnostic in &diagnostics {
        tracing::warn!("{}", diagnostic);
    }

    let demodulator = config.demodulator.as_ref().and_then(|demodulator| {
        match rtl433::spawn(demodulator) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::error!("Failed to start {}: {}", demodulator.command, e);
                None
            }
        }
    });

    let mut client = RumqttcClient::new(&config.mqtt);
    let bus_rx = client.connect().await.map_err(|e| {
        anyhow!(
            "Failed to connect to MQTT broker {}:{}: {}",
            config.mqtt.broker,
            config.mqtt.port,
            e
        )
    })?;
    let client = Arc::new(client);

    let exporter = Arc::new(MqttExporter::new(client.clone(), &config.export.prefix));
    let weather: Option<Arc<dyn WeatherSource>> = match config.online.provider_settings() {
        Some(settings) => {
            let provider = Provider::new(settings).context("Failed to build weather client")?;
            tracing::info!("Weather provider: {}", provider.name());
            Some(Arc::new(provider) as Arc<dyn WeatherSource>)
        }
        None => None,
    };

    let engine = Engine::new(
        EngineSettings::from_config(&config),
        config.device_records(),
        exporter,
        weather,
    )
    .await
    .context("Failed to register devices")?;

    for topic in engine.subscriptions() {
        client
            .subscribe(&topic)
            .await
            .map_err(|e| anyhow!("Failed to subscribe to {}: {}", topic, e))?;
    }

    let (api_shutdown_tx, api_shutdown_rx) = oneshot::channel();
    let api_task = config.api.as_ref().map(|api_config| {
        let listen = api_config.listen.clone();
        let port = api_config.port;
        let state = engine.state_handle();
        tokio::spawn(async move {
            if let Err(e) = api::serve(listen, port, state, api_shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        })
    });

    tracing::info!("Press Ctrl+C to exit");
    engine
        .run(bus_rx, async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    api_shutdown_tx.send(()).ok();
    if let Some(task) = api_task {
        task.await.ok();
    }
    if let Some(task) = demodulator {
        task.abort();
    }

    tracing::info!("radiotempd shutdown complete");

    Ok(())
}

/// Install the subscriber; `--debug` raises every target to at least DEBUG
fn init_tracing(logging: &LoggingConfig, debug: bool) {
    tracing_subscriber::registry()
        .with(logging.targets(debug))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
