//! Tracing subscriber setup.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::diagnostics::UdpSink;

/// Install the global subscriber.
///
/// JSON lines go to stdout through a non-blocking writer so logging never
/// stalls the runtime. When `sink` is set, the same events are mirrored as
/// plain-text datagrams. Filtering follows `RUST_LOG`, defaulting to `info`.
///
/// The returned guard must live for the whole process or buffered lines are
/// lost on exit.
pub fn init_tracing(sink: Option<UdpSink>) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().json().with_writer(non_blocking);
    let udp_layer = sink.map(|sink| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .with_writer(sink)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(udp_layer)
        .init();

    guard
}
