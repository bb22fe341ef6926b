//! Subcommand bodies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hostlink_peer::PeerServer;
use hostlink_settings::HostlinkSettings;
use hostlink_socket::{SocketChannel, SocketController, SocketNotice};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How long to wait for queued frames to flush before exiting.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Run the loopback peer until Ctrl+C.
pub async fn serve(settings: HostlinkSettings) -> Result<()> {
    let server = Arc::new(PeerServer::new(settings));
    let listener = server.bind().await.context("Failed to start peer")?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    eprintln!("hostlink peer listening on ws://{addr}");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        signal.cancel();
    }));

    server.serve(listener, shutdown).await?;
    Ok(())
}

/// Connect, or fail once `connect_timeout` passes.
async fn open(settings: &HostlinkSettings, connect_timeout: Duration) -> Result<SocketController> {
    let controller = SocketController::from_settings(&settings.socket);
    controller.start();
    if !controller.wait_open(connect_timeout).await {
        controller.disconnect();
        bail!(
            "could not connect to {} within {}ms",
            settings.socket.url,
            connect_timeout.as_millis()
        );
    }
    Ok(controller)
}

/// Issue one call and return its result.
pub async fn call(
    settings: &HostlinkSettings,
    event: &str,
    data: Value,
    timeout: Option<Duration>,
    connect_timeout: Duration,
) -> Result<Value> {
    let controller = open(settings, connect_timeout).await?;
    let bridge = controller.bridge(settings.calls.timeout_ms.map(Duration::from_millis));

    let outcome = match timeout {
        Some(timeout) => bridge.call_with_timeout(event, data, timeout).await,
        None => bridge.call_with_default_timeout(event, data).await,
    };
    controller.close(CLOSE_GRACE).await;
    outcome.with_context(|| format!("call {event} failed"))
}

/// Send one event and wait for it to be flushed.
pub async fn emit(
    settings: &HostlinkSettings,
    event: &str,
    data: Value,
    connect_timeout: Duration,
) -> Result<()> {
    let controller = open(settings, connect_timeout).await?;
    let bridge = controller.bridge(None);
    let sent = bridge.send(event, data);
    controller.close(CLOSE_GRACE).await;
    if !sent {
        bail!("event {event} was not sent: socket closed");
    }
    Ok(())
}

/// Print every notice as it arrives until Ctrl+C. Keeps reconnecting.
pub async fn watch(settings: &HostlinkSettings) -> Result<()> {
    let controller = SocketController::from_settings(&settings.socket);
    let _subscriptions: Vec<_> = [SocketChannel::Open, SocketChannel::Error, SocketChannel::Payload]
        .into_iter()
        .map(|channel| controller.listen(channel, |notice| println!("{}", render(notice))))
        .collect();

    controller.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    controller.close(CLOSE_GRACE).await;
    Ok(())
}

/// One output line per notice. Payloads print as their wire JSON.
fn render(notice: &SocketNotice) -> String {
    match notice {
        SocketNotice::Payload(envelope) => {
            envelope.to_frame().unwrap_or_else(|e| format!("<unencodable payload: {e}>"))
        }
        other => format!("# {other}"),
    }
}
