//! Diagnostics go to stderr through `tracing`; stdout is reserved for
//! command output. `RUST_LOG` overrides the level chosen on the command line.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub struct LogConfig {
    pub level: &'static str,
}

impl LogConfig {
    pub fn from_verbosity(verbose: bool) -> Self {
        LogConfig {
            level: if verbose { "debug" } else { "warn" },
        }
    }
}

pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), config.level)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    // A second initialisation (tests) is not an error worth reporting.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LogConfig::from_verbosity(false).level, "warn");
        assert_eq!(LogConfig::from_verbosity(true).level, "debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(&LogConfig::from_verbosity(false));
        init_logging(&LogConfig::from_verbosity(true));
    }
}
