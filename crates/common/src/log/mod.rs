use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

/// Installs the global subscriber: non-blocking stdout filtered by
/// `RUST_LOG`. Hold the returned guard until exit or buffered lines are lost.
pub fn logging_stdout() -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let verbose = cfg!(debug_assertions);

    let filter = EnvFilter::builder()
        .with_default_directive(default_level().into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_target(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .init();

    guard
}

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}
