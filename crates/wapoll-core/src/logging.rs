//! Tracing subscriber initialisation.
//!
//! Filter precedence: `RUST_LOG` if set, otherwise the configured level.
//! Output goes to stderr so stdout stays free for the pairing code.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Logging output options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogOptions {
    /// Default filter directive (e.g. `info`, `wapoll_runtime=debug`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Build the env filter for the given options.
pub fn build_filter(opts: &LogOptions) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&opts.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (e.g. by a test
/// harness); the existing one is kept.
pub fn init_subscriber(opts: &LogOptions) -> bool {
    let filter = build_filter(opts);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if opts.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_falls_back() {
        let opts = LogOptions {
            level: "not a [valid] directive ===".into(),
            json: false,
        };
        // Must not panic; falls back to info.
        let _filter = build_filter(&opts);
    }

    #[test]
    fn second_init_is_rejected() {
        let opts = LogOptions::default();
        let _ = init_subscriber(&opts);
        assert!(!init_subscriber(&opts));
    }
}
