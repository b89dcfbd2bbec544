//! Optional supervision of the rtl_433 demodulator process.

use std::process::ExitStatus;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

/// How to start the demodulator
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path to the rtl_433 binary
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Start the demodulator and watch it from a background task.
///
/// The child is killed when the returned task is aborted or dropped along
/// with the runtime. The task resolves to the exit status once the child
/// exits on its own.
pub fn spawn(config: &Config) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = Command::new(&config.command)
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    info!(
        "Started {} (pid {})",
        config.command,
        child.id().map_or_else(|| "?".to_string(), |id| id.to_string())
    );

    let command = config.command.clone();
    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                warn!("{} exited: {}", command, status);
                Some(status)
            }
            Err(e) => {
                warn!("Failed to wait for {}: {}", command, e);
                None
            }
        }
    }))
}
