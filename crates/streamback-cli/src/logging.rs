//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use streamback_core::config::LoggingConfig;

/// Filter directives: `RUST_LOG` wins, then `--verbose`, then the configured level.
pub fn build_filter(logging: Option<&LoggingConfig>, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let mut directives = vec![level];
    if let Some(logging) = logging {
        directives.extend(logging.filters.iter().cloned());
    }
    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(logging: Option<&LoggingConfig>, verbose: bool) {
    let filter = build_filter(logging, verbose);
    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");

    let layer = match (json, stdout) {
        (true, true) => tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout).boxed(),
        (true, false) => tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).boxed(),
        (false, true) => tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed(),
        (false, false) => tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}
