//! StackServer binary.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use stackserver::cli::Cli;
use stackserver::diagnostics::UdpSink;
use stackserver::logging::init_tracing;
use stackserver::{DrainResult, StackServer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The subscriber is not installed yet, so a broken sink can only go to stderr.
    let sink = match UdpSink::connect(&cli.debughost, cli.debugport) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("stackserver: UDP diagnostics disabled: {e}");
            None
        }
    };
    let sink_target = sink.as_ref().map(UdpSink::target);
    let _guard = init_tracing(sink);
    if let Some(target) = sink_target {
        info!(addr = %target, "UDP diagnostics enabled");
    }

    let server = StackServer::new(cli.server_config())?;
    let bound = server.bind().await?;

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    match bound.run(shutdown).await {
        DrainResult::Complete => {
            info!("StackServer stopped");
            Ok(())
        }
        DrainResult::Timeout { remaining } => {
            Err(format!("shutdown drain timed out with {remaining} connections open").into())
        }
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    shutdown.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                }
            }
        });
    }
}
