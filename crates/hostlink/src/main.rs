//! # hostlink
//!
//! Command-line entry point: runs the loopback peer, or connects to one as a
//! reconnecting socket client to issue calls, emit events, and watch traffic.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hostlink_settings::HostlinkSettings;
use serde_json::Value;

/// Correlated call/event bridge over a loopback WebSocket.
#[derive(Parser, Debug)]
#[command(name = "hostlink", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.hostlink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Socket endpoint, overriding settings.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log level when `RUST_LOG` is unset, overriding settings.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the loopback peer until interrupted.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Issue one call and print its result as JSON.
    Call {
        /// Event name.
        event: String,
        /// JSON payload.
        #[arg(long)]
        data: Option<String>,
        /// Give up after this many milliseconds (defaults to `calls.timeoutMs`).
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// How long to wait for the socket to open.
        #[arg(long, default_value = "5000")]
        connect_timeout_ms: u64,
    },
    /// Send one fire-and-forget event.
    Emit {
        /// Event name.
        event: String,
        /// JSON payload.
        #[arg(long)]
        data: Option<String>,
        /// How long to wait for the socket to open.
        #[arg(long, default_value = "5000")]
        connect_timeout_ms: u64,
    },
    /// Print connection notices and inbound envelopes until interrupted.
    Watch,
}

impl Cli {
    /// Settings from file and env, with command-line overrides on top.
    fn resolve_settings(&self) -> Result<HostlinkSettings> {
        let mut settings = match &self.settings {
            Some(path) => hostlink_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => hostlink_settings::load_settings().context("Failed to load settings")?,
        };

        if let Some(url) = &self.url {
            settings.socket.url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Command::Serve { host, port } = &self.command {
            if let Some(host) = host {
                settings.peer.host.clone_from(host);
            }
            if let Some(port) = port {
                settings.peer.port = *port;
            }
        }
        hostlink_settings::loader::validate(&settings).context("Invalid settings")?;
        Ok(settings)
    }
}

/// Parse an optional `--data` argument. Absent means `null`.
fn parse_data(data: Option<&str>) -> Result<Value> {
    data.map_or(Ok(Value::Null), |raw| {
        serde_json::from_str(raw).with_context(|| format!("--data is not valid JSON: {raw}"))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    if settings.logging.json {
        hostlink_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        hostlink_core::logging::init_subscriber(&settings.logging.level);
    }

    match cli.command {
        Command::Serve { .. } => commands::serve(settings).await,
        Command::Call {
            event,
            data,
            timeout_ms,
            connect_timeout_ms,
        } => {
            let data = parse_data(data.as_deref())?;
            let reply = commands::call(
                &settings,
                &event,
                data,
                timeout_ms.map(Duration::from_millis),
                Duration::from_millis(connect_timeout_ms),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        Command::Emit {
            event,
            data,
            connect_timeout_ms,
        } => {
            let data = parse_data(data.as_deref())?;
            commands::emit(
                &settings,
                &event,
                data,
                Duration::from_millis(connect_timeout_ms),
            )
            .await
        }
        Command::Watch => commands::watch(&settings).await,
    }
}
