use crate::console::ConsoleSink;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a given `-v`/`-q` combination.
pub fn default_directive(verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    format!("rom_workbench={level}")
}

/// Install the global subscriber. `RUST_LOG` overrides the CLI verbosity.
///
/// With a sink, records go to the console pane; otherwise to stderr.
pub fn init_logging(verbose: u8, quiet: bool, sink: Option<ConsoleSink>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let registry = tracing_subscriber::registry().with(filter);
    let res = match sink {
        Some(sink) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(sink)
                    .with_ansi(false)
                    .with_target(false)
                    .without_time(),
            )
            .try_init(),
        None => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };
    // A second init (tests, re-entry) keeps the first subscriber.
    let _ = res;
}
