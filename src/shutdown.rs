use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Wires SIGINT and SIGTERM to a cancellation token.
///
/// `role` names the process in the shutdown log line ("gate" or "worker").
/// The token fires once, on the first signal: the gate drains its HTTP
/// server off it, a worker finishes its in-flight job and deregisters its
/// routes.
pub fn install_handler(role: &'static str) -> CancellationToken {
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let caught = first_signal().await;
        tracing::info!(role, signal = caught, "Shutdown signal caught, draining");
        trigger.cancel();
    });

    shutdown
}

/// Waits for the first of SIGTERM/SIGINT and names it.
async fn first_signal() -> &'static str {
    let mut terminate = signal(SignalKind::terminate()).expect("SIGTERM stream");
    let mut interrupt = signal(SignalKind::interrupt()).expect("SIGINT stream");

    tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    }
}
